//! Environment overlays.

use std::collections::BTreeMap;

/// Environment variable mapping (name → value).
pub type Environment = BTreeMap<String, String>;

/// Layer `overrides` on top of `defaults`; overrides win on collision.
pub fn merge_env<'a, I>(defaults: &Environment, overrides: I) -> Environment
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut env = defaults.clone();
    for (k, v) in overrides {
        env.insert(k.clone(), v.clone());
    }
    env
}
