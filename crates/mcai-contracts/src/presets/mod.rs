mod table;

pub use table::{
    default_catalog, resolve, PresetTable, ProviderBinding, ProviderKind, AUTO_ROUTE_MODEL,
    DEFAULT_PRESET,
};
