use std::{io::Write, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use scube::{
    adapters::fields::body_bytes, util::uri::parse_bucket_uri, Options, Scube, SignedOperation,
    TransferOptions,
};
use serde_json::{json, Value};
use tracing::{error, info, span, Instrument, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scube", version, about = "Directory-style access to an S3 bucket")]
struct Cli {
    /// `s3://bucket[/prefix]` or a bare bucket name
    #[arg(env = "SCUBE_BUCKET")]
    bucket: String,

    #[arg(long, env = "SCUBE_REGION", default_value = scube::model::options::DEFAULT_REGION)]
    region: String,

    #[arg(long, env = "SCUBE_DELIMITER", default_value = scube::model::options::DEFAULT_DELIMITER)]
    delimiter: String,

    #[arg(long, env = "SCUBE_PUBLIC_KEY")]
    public_key: Option<String>,

    #[arg(long, env = "SCUBE_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Custom endpoint, e.g. a MinIO or R2 URL
    #[arg(long, env = "SCUBE_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, env = "SCUBE_FORCE_PATH_STYLE")]
    force_path_style: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the entries directly under a prefix
    Ls { prefix: Option<String> },
    /// Delete every object under a prefix
    Rm {
        prefix: Option<String>,
        /// Treat the prefix as a directory (append the delimiter)
        #[arg(long)]
        dir: bool,
    },
    /// List buckets visible to the credentials
    Buckets,
    /// Show an object's metadata
    Head { key: String },
    /// Write an object's body to stdout
    Cat { key: String },
    /// Upload a local file
    Put {
        key: String,
        file: PathBuf,
        #[arg(long)]
        part_size: Option<usize>,
        #[arg(long)]
        queue_size: Option<usize>,
    },
    /// Print a signed URL
    Presign {
        key: String,
        #[arg(long, default_value = "getObject")]
        operation: SignedOperation,
        /// Lifetime in seconds
        #[arg(long, default_value_t = scube::model::request::DEFAULT_SIGNED_URL_EXPIRES)]
        expires: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let span = span!(Level::INFO, "main", context = "main");
    let result = async {
        info!("called");
        run(cli).await
    }
    .instrument(span)
    .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_group = match &err {
                scube::Error::Config(_) => "config",
                scube::Error::Param(_) => "param",
                scube::Error::Remote(_) => "remote",
            };
            error!(error_message = %err, error_group = error_group);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> scube::Result<()> {
    let uri = parse_bucket_uri(&cli.bucket)?;
    info!(bucket = %uri.bucket, prefix = ?uri.prefix, "args");

    let options = Options {
        region: cli.region,
        delimiter: cli.delimiter,
        bucket: uri.bucket,
        public_key: cli.public_key,
        secret_key: cli.secret_key,
        endpoint: cli.endpoint,
        force_path_style: cli.force_path_style,
    };
    let scube = Scube::new(options).await?;

    match cli.command {
        Command::Ls { prefix } => {
            let params = match prefix.or(uri.prefix) {
                Some(prefix) => json!({ "prefix": prefix }),
                None => json!({}),
            };
            print_json(&scube.list_dir(params).await?)
        }
        Command::Rm { prefix, dir } => {
            let prefix = prefix.or(uri.prefix).ok_or_else(|| {
                scube::Error::Param("rm needs a prefix, refusing to empty the bucket".to_string())
            })?;
            if dir {
                scube.delete_dir(json!({ "prefix": prefix })).await?;
            } else {
                scube.delete_prefix(json!({ "prefix": prefix })).await?;
            }
            info!(prefix = %prefix, "deleted");
            Ok(())
        }
        Command::Buckets => print_json(&scube.list_buckets(Value::Null).await?),
        Command::Head { key } => print_json(&scube.head_object(json!({ "key": key })).await?),
        Command::Cat { key } => {
            let object = scube.get_object(json!({ "key": key })).await?;
            let body = object.get("body").and_then(body_bytes).unwrap_or_default();
            std::io::stdout()
                .write_all(&body)
                .map_err(|err| scube::Error::Param(format!("failed to write body: {}", err)))
        }
        Command::Put {
            key,
            file,
            part_size,
            queue_size,
        } => {
            let body = tokio::fs::read(&file).await.map_err(|err| {
                scube::Error::Param(format!("failed to read: {}, {}", file.display(), err))
            })?;

            let defaults = TransferOptions::default();
            let options = TransferOptions {
                part_size: part_size.unwrap_or(defaults.part_size),
                queue_size: queue_size.unwrap_or(defaults.queue_size),
            };

            let response = scube
                .upload(json!({ "key": key, "body": body }), options)
                .await?;
            print_json(&response)
        }
        Command::Presign {
            key,
            operation,
            expires,
        } => {
            let url = scube
                .get_signed_url(operation, json!({ "key": key, "expires": expires }))
                .await?;
            println!("{}", url);
            Ok(())
        }
    }
}

fn print_json(value: &Value) -> scube::Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| scube::Error::Param(format!("failed to render response: {}", err)))?;
    println!("{}", text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rm_dir() {
        let cli = Cli::try_parse_from(["scube", "s3://my-bucket", "rm", "photos", "--dir"]).unwrap();

        assert_eq!(cli.bucket, "s3://my-bucket");
        assert!(matches!(
            cli.command,
            Command::Rm { prefix: Some(ref prefix), dir: true } if prefix == "photos"
        ));
    }

    #[test]
    fn test_parse_presign_operation() {
        let cli = Cli::try_parse_from([
            "scube", "my-bucket", "presign", "k", "--operation", "putObject", "--expires", "60",
        ])
        .unwrap();

        assert!(matches!(
            cli.command,
            Command::Presign { operation: SignedOperation::PutObject, expires: 60, .. }
        ));
    }
}
