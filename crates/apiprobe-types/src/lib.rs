//! Shared leaf types for apiprobe.
//!
//! Request and response bodies, plan parameters and shadow-store entries are
//! all dynamically typed JSON; this crate owns the equality, merge and
//! traversal rules defined on that sum type, plus the `<meqa …>` description
//! tag and the pattern sampler the data generator uses for strings.

mod pattern;
mod tag;
mod value;

pub use pattern::sample_pattern;
pub use tag::{MeqaTag, FLAG_FAIL, FLAG_SUCCESS, FLAG_WEAK};
pub use value::{
    iterate_fields, iterate_maps, map_add, map_combine, map_is_compatible, map_replace,
    number_equal, remove_nulls, time_equal, to_param_string, values_match, JsonMap,
};
