//! Hard limits guarding the engine and the wire layer against runaway input.

/// Tags attached to a single record.
pub const MAX_TAGS_PER_RECORD: usize = 256;

pub const MAX_TENANTS: usize = 10_000;
pub const MAX_TENANT_NAME_LEN: usize = 64;
