use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::{env, path::PathBuf};

/// Default cap on a single direct upload (1 GiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

const DEFAULT_SERVER_URL: &str = "http://localhost:4000";

/// Command-line interface.
#[derive(Parser, Debug)]
#[command(author, version, about = "Personal video hosting: gallery server and publishing client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve(ServeArgs),
    /// Publish a local video file to a running server
    Publish(PublishArgs),
    /// Print the public catalog of a running server
    List(ClientArgs),
    /// Delete a published video by name or key
    Delete(DeleteArgs),
}

/// Server flags; each overrides the matching environment variable.
#[derive(Args, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Host to bind to (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding disk-mode uploads (overrides UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<PathBuf>,

    /// Flat JSON catalog used in disk mode (overrides CATALOG_FILE)
    #[arg(long)]
    pub catalog_file: Option<PathBuf>,

    /// Largest accepted direct upload in bytes (overrides MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ClientArgs {
    /// Server base URL (overrides MOVIE_HOST_URL)
    #[arg(long)]
    pub server: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Video file to publish
    pub file: PathBuf,

    /// Display name (defaults to the file name)
    #[arg(long)]
    pub name: Option<String>,

    #[command(flatten)]
    pub client: ClientArgs,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Name or key of the video
    pub name: String,

    #[command(flatten)]
    pub client: ClientArgs,
}

/// Connection settings for an S3-compatible bucket.
#[derive(Clone)]
pub struct BucketConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    pub public_base_url: Option<String>,
}

impl std::fmt::Debug for BucketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketConfig")
            .field("endpoint", &self.endpoint)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

/// Centralized server configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub catalog_file: PathBuf,
    pub owner_secret: Option<String>,
    pub max_upload_bytes: u64,
    /// Present only when all four bucket connection parameters are set.
    pub bucket: Option<BucketConfig>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("upload_dir", &self.upload_dir)
            .field("catalog_file", &self.catalog_file)
            .field("owner_secret", &self.owner_secret.as_ref().map(|_| "<redacted>"))
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl AppConfig {
    /// Merge CLI args with the process environment.
    pub fn from_env_and_args(args: ServeArgs) -> Result<Self> {
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Merge CLI args with values from `lookup`. Empty values count as unset.
    pub fn resolve(args: ServeArgs, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let env_port = match var("PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => 4000,
        };
        let env_max_upload = match var("MAX_UPLOAD_BYTES") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing MAX_UPLOAD_BYTES value `{}`", value))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let bucket = match (
            var("R2_ENDPOINT"),
            var("R2_ACCESS_KEY_ID"),
            var("R2_SECRET_ACCESS_KEY"),
            var("R2_BUCKET"),
        ) {
            (Some(endpoint), Some(access_key), Some(secret_key), Some(bucket)) => {
                Some(BucketConfig {
                    endpoint,
                    access_key,
                    secret_key,
                    bucket,
                    region: var("R2_REGION").unwrap_or_else(|| "auto".into()),
                    public_base_url: var("R2_PUBLIC_BASE_URL"),
                })
            }
            _ => None,
        };

        Ok(Self {
            host: args
                .host
                .or_else(|| var("HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            upload_dir: args
                .upload_dir
                .or_else(|| var("UPLOAD_DIR").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./upload")),
            catalog_file: args
                .catalog_file
                .or_else(|| var("CATALOG_FILE").map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("./movies.json")),
            owner_secret: var("OWNER_HASH"),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max_upload),
            bucket,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings for the publishing client subcommands.
#[derive(Clone)]
pub struct ClientConfig {
    pub server_url: String,
    /// Precomputed owner hash (`OWNER_HASH`).
    pub owner_secret: Option<String>,
    /// Plain passphrase (`OWNER_PASSPHRASE`); hashed before use and
    /// preferred over `owner_secret`.
    pub owner_passphrase: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("owner_secret", &self.owner_secret.as_ref().map(|_| "<redacted>"))
            .field(
                "owner_passphrase",
                &self.owner_passphrase.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env_and_args(args: ClientArgs) -> Self {
        Self::resolve(args, |name| env::var(name).ok())
    }

    pub fn resolve(args: ClientArgs, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            server_url: args
                .server
                .or_else(|| var("MOVIE_HOST_URL"))
                .unwrap_or_else(|| DEFAULT_SERVER_URL.into()),
            owner_secret: var("OWNER_HASH"),
            owner_passphrase: var("OWNER_PASSPHRASE"),
        }
    }
}
