// Pipeline processing: normalization, conversion, validation and DST handling

pub mod bounds;
pub mod continuity;
pub mod cumulative;
pub mod dst;
pub mod normalize;
pub mod outcome;
