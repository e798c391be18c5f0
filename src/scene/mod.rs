/// Scene-graph data model handed over by the upstream layout engine.
pub mod model;
