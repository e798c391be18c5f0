/// Resolution of abstract paints and stroke decoration into drawable form.
pub mod resolve;
/// Concrete shaders and their CPU evaluation.
pub mod shader;
