/// Vertex arrays, face batches and outlines
pub mod geometry;
/// Tagged material variants
pub mod material;
/// The versioned MST container
pub mod mesh;
/// Embedded texture blobs
pub mod texture;
