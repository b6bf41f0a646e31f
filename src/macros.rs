/// Implements `From<T>` for each listed type by wrapping it in the given enum variant.
/// With `into`, the value is converted to the variant's payload type first.
macro_rules! impl_from_variant {
    ($target:ident::$variant:ident: into $($t:ty),+) => {$(
        impl From<$t> for $target {
            fn from(value: $t) -> Self {
                $target::$variant(value.into())
            }
        }
    )+};
    ($target:ident::$variant:ident: $($t:ty),+) => {$(
        impl From<$t> for $target {
            fn from(value: $t) -> Self {
                $target::$variant(value)
            }
        }
    )+};
}
