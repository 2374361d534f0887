pub mod convert;
pub mod histogram;
pub mod layout;
pub mod options;
pub mod render;

pub use convert::convert_to_png;
pub use histogram::{HistStyle, Histogram1D};
pub use layout::{draw_option, legend_box, CanvasLayout, LegendBox, LegendPosition};
pub use options::{PlotOptions, RatioMode};
pub use render::plot_1d;
