#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use posedepth_image as image;

#[doc(inline)]
pub use posedepth_3d as k3d;

#[doc(inline)]
pub use posedepth_store as store;

#[doc(inline)]
pub use posedepth_extract as extract;
