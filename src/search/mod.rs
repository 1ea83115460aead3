pub mod vector;

pub use vector::{Retriever, VectorHit, VectorIndex, VectorRetriever};
