// Pure pipeline stages: scanning, extended JSON resolution, normalization, errors.
pub mod error;
pub mod extjson;
pub mod normalize;
pub mod scan;
pub mod value;
