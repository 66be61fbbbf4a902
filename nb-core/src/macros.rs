// Build the Option<BTreeMap<String, String>> shape that object metadata
// labels and annotations want, from key => value pairs.
#[macro_export]
macro_rules! klabel {
    ($($key:expr => $val:expr),+$(,)?) => {
        Some(::std::collections::BTreeMap::from([$(($key.to_string(), $val.to_string())),+]))
    };
}

pub use klabel;
