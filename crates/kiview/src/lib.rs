//! Viewer core for KiCad documents: viewport transform, hit-testing and the
//! selection / hierarchy state machine. Drawing is left to a [`Renderer`].

pub mod hittest;
pub mod transform;
pub mod viewer;

pub use hittest::HitTester;
pub use transform::{wheel_zoom_factor, ViewportTransform};
pub use viewer::{
    Details, DescendOutcome, Effect, Frame, LoadOutcome, LoadTicket, NullRenderer, Renderer,
    SelectionChanged, Viewer, ViewerError, ViewerOptions, ViewerState,
};
