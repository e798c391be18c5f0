/// Conversion of abstract path descriptions into concrete Bezier paths.
pub mod path;
