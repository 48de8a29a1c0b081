// Generic path addressing over design documents.

mod address;

pub use address::{
    get, get_mut, leaf_paths, remove, set, with_value, PathAddress, PathError,
};
