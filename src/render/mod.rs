//! Pure rendering: `vello_cpu` layer surfaces and the layer compositor.

pub(crate) mod compositor;
pub(crate) mod raster;
