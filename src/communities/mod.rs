pub mod louvain;

pub use louvain::{vertex_following, AlgoLouvain, Comm};
