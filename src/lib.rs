pub mod accel;
pub mod api;
pub mod math;
pub mod selector;
/// Volume sampling and ray-traversal kernels for volumetric rendering.
/// Point queries return trilinear samples; ray queries yield gap-free
/// macrocell-bounded intervals with conservative value ranges.
pub mod traversal;
pub mod volume;

pub use accel::{GridAccelerator, BUILD_THREADS_ENV, MACROCELL_SIDE};
pub use api::error::KernelError;
pub use math::{Box3, Range1, Ray};
pub use selector::ValueSelector;
pub use traversal::{
    Interval, IntervalIterator, IntervalSoa, RaySoa, ITERATOR_STATE_ALIGN_1,
    ITERATOR_STATE_ALIGN_16, ITERATOR_STATE_ALIGN_4, ITERATOR_STATE_ALIGN_8,
    ITERATOR_STATE_SIZE_1, ITERATOR_STATE_SIZE_16, ITERATOR_STATE_SIZE_4, ITERATOR_STATE_SIZE_8,
    LANE_WIDTHS,
};
pub use volume::{procedural, StructuredVolume, VoxelBuffer, VoxelType};
