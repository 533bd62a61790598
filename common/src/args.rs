use clap::Parser;

#[derive(Parser, Debug, Clone)]
pub struct StormClientArgs {
    #[arg(long, env = "STORM_CLIENT_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    #[arg(long, env = "STORM_CLIENT_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    #[arg(long, env = "STORM_CLIENT_CIRCUIT_FAILURE_THRESHOLD", default_value_t = 5)]
    pub circuit_failure_threshold: u32,

    #[arg(long, env = "STORM_CLIENT_CIRCUIT_RESET_SECS", default_value_t = 30)]
    pub circuit_reset_secs: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct JarCacheArgs {
    #[arg(long, env = "JAR_CACHE_DIR", default_value = "/var/cache/storm-jars")]
    pub cache_dir: String,

    #[arg(long, env = "JAR_CACHE_CAPACITY_BYTES", default_value_t = 10 * 1024 * 1024 * 1024)]
    pub cache_capacity_bytes: u64,
}
