mod access;

pub use access::enforce_access;
