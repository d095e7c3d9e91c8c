/// Structured volumes and their voxel storage.
pub mod procedural;
pub mod structured;
pub mod voxels;

pub use structured::StructuredVolume;
pub use voxels::{VoxelBuffer, VoxelType};
