use figment::providers::Env;

/// Environment variables that configure a backend without the `QUARRY__` prefix.
///
/// These are the names used by the service containers of the test environment,
/// so that a connection can be made against the emulators without extra wiring.
pub struct LegacyEnv;

impl LegacyEnv {
    pub const MINIO_END_POINT: &'static str = "MINIO_END_POINT";
    pub const MINIO_ACCESS_KEY: &'static str = "MINIO_ACCESS_KEY";
    pub const MINIO_SECRET_KEY: &'static str = "MINIO_SECRET_KEY";
    pub const MINIO_SECURE: &'static str = "MINIO_SECURE";
    pub const STORAGE_EMULATOR_HOST: &'static str = "STORAGE_EMULATOR_HOST";
    pub const GCP_PROJECT_ID: &'static str = "GCP_PROJECT_ID";
    pub const MONGODB_CONNECTION: &'static str = "MONGODB_CONNECTION";
    pub const MONGODB_DATABASE: &'static str = "MONGODB_DATABASE";
    pub const REDIS_SERVER: &'static str = "REDIS_SERVER";
    pub const AZURE_STORAGE_CONNECTION_STRING: &'static str = "AZURE_STORAGE_CONNECTION_STRING";

    /// Returns the configuration key that a legacy variable maps to.
    pub fn config_key(name: &str) -> Option<&'static str> {
        let key = match name.to_ascii_uppercase().as_str() {
            Self::MINIO_END_POINT => "s3.endpoint",
            Self::MINIO_ACCESS_KEY => "s3.access_key",
            Self::MINIO_SECRET_KEY => "s3.secret_key",
            Self::MINIO_SECURE => "s3.secure",
            Self::STORAGE_EMULATOR_HOST => "gcs.endpoint",
            Self::GCP_PROJECT_ID => "gcs.project_id",
            Self::MONGODB_CONNECTION => "mongodb.connection_string",
            Self::MONGODB_DATABASE => "mongodb.database",
            Self::REDIS_SERVER => "redis.server",
            Self::AZURE_STORAGE_CONNECTION_STRING => "azure.connection_string",
            _ => return None,
        };
        Some(key)
    }

    pub fn provider() -> Env {
        Env::raw().filter_map(|name| Self::config_key(name.as_str()).map(Into::into))
    }
}
