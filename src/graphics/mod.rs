pub mod canvas;
pub mod color;
pub mod presenter;
pub mod projection;

pub use color::Rgb;
pub use presenter::Presenter;
pub use projection::Camera;
