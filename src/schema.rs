use sea_query::Iden;

/// Metadata table - key-value store for database configuration
#[derive(Iden)]
pub enum Metadata {
    Table,
    Key,
    Value,
}

/// Users table - identities resolved from bearer tokens
#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Name,
    Role,
    ApiToken,
}

/// Processes table - reusable activity templates
#[derive(Iden)]
pub enum Processes {
    Table,
    Id,
    Name,
    Description,
    MetadataSchema,
    IsOfficial,
    CreatedBy,
    CreatedAtMs,
}

/// Instances table - timed occurrences of a process
#[derive(Iden)]
pub enum Instances {
    Table,
    Id,
    ProcessId,
    UserId,
    StartTimeMs,
    EndTimeMs,
    DurationSeconds,
    Metadata,
    CreatedAtMs,
    UpdatedAtMs,
}
