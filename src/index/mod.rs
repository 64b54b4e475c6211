pub mod leaf;
pub mod nonleaf;
pub mod tree;
