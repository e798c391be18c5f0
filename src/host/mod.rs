//! View-host side of the renderer: layers that own scenes and absolute layouts that place them.

pub mod layer;
pub mod layout;
