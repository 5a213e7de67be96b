#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use shapeflow_chamfer as chamfer;

#[doc(inline)]
pub use shapeflow_index as index;

#[doc(inline)]
pub use shapeflow_embed as embed;
