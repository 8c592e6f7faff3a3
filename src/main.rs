//! shardis - command-line client
//!
//! Routes one command to the shard that owns a key and prints the reply.

use anyhow::{bail, Context};
use shardis::hashing::HashAlgorithm;
use shardis::{AsyncRouter, Command, KeyTag, RouterConfig, ShardDescriptor, Verb};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Client configuration
struct Config {
    /// Shards, in ring order
    shards: Vec<ShardDescriptor>,
    /// Ring hash
    hash: HashAlgorithm,
    /// Key tag setting
    key_tag: KeyTag,
    /// Read timeout applied to every shard
    timeout: Option<Duration>,
    /// Password applied to every shard
    password: Option<String>,
    /// Only print which shard owns the key
    locate: bool,
    /// Routing key
    key: String,
    /// Verb and arguments
    command: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shards: Vec::new(),
            hash: HashAlgorithm::default(),
            key_tag: KeyTag::default(),
            timeout: None,
            password: None,
            locate: false,
            key: String::new(),
            command: Vec::new(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();
        let mut positional = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--shard" | "-s" => {
                    let value = option_value(&args, i)?;
                    let shard = value
                        .parse::<ShardDescriptor>()
                        .with_context(|| format!("invalid --shard {}", value))?;
                    config.shards.push(shard);
                    i += 2;
                }
                "--hash" => {
                    let value = option_value(&args, i)?;
                    config.hash = value.parse().map_err(anyhow::Error::msg)?;
                    i += 2;
                }
                "--key-tag" => {
                    config.key_tag = KeyTag::Custom(option_value(&args, i)?.to_string());
                    i += 2;
                }
                "--no-key-tag" => {
                    config.key_tag = KeyTag::Disabled;
                    i += 1;
                }
                "--timeout" | "-t" => {
                    let value = option_value(&args, i)?;
                    let ms: u64 = value
                        .parse()
                        .with_context(|| format!("invalid timeout {}", value))?;
                    config.timeout = Some(Duration::from_millis(ms));
                    i += 2;
                }
                "--password" | "-a" => {
                    config.password = Some(option_value(&args, i)?.to_string());
                    i += 2;
                }
                "--locate" => {
                    config.locate = true;
                    i += 1;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("shardis version {}", shardis::VERSION);
                    std::process::exit(0);
                }
                flag if flag.starts_with("--") => {
                    bail!("unknown argument: {}", flag);
                }
                _ => {
                    positional.push(args[i].clone());
                    i += 1;
                }
            }
        }

        if config.shards.is_empty() {
            config.shards.push(ShardDescriptor::default());
        }

        let mut positional = positional.into_iter();
        config.key = positional.next().context("missing <KEY>")?;
        config.command = positional.collect();
        if !config.locate && config.command.is_empty() {
            bail!("missing <COMMAND>");
        }

        Ok(config)
    }

    fn router_config(&self) -> RouterConfig {
        let shards = self
            .shards
            .iter()
            .cloned()
            .map(|shard| {
                let shard = match self.timeout {
                    Some(timeout) => shard.with_read_timeout(timeout),
                    None => shard,
                };
                match &self.password {
                    Some(password) => shard.with_password(password.clone()),
                    None => shard,
                }
            })
            .collect();

        RouterConfig::new(shards)
            .with_hash(self.hash)
            .with_key_tag(self.key_tag.clone())
    }

    fn command(&self) -> anyhow::Result<Command> {
        let (name, args) = self.command.split_first().context("missing <COMMAND>")?;
        let verb = Verb::from_name(name.as_bytes())
            .with_context(|| format!("unknown command: {}", name))?;
        Ok(Command::with_args(verb, args.iter().cloned()))
    }
}

fn option_value(args: &[String], i: usize) -> anyhow::Result<&str> {
    match args.get(i + 1) {
        Some(value) => Ok(value.as_str()),
        None => bail!("{} requires a value", args[i]),
    }
}

fn print_help() {
    println!(
        r#"
shardis - Sharded RESP client

USAGE:
    shardis [OPTIONS] <KEY> <COMMAND> [ARGS...]

OPTIONS:
    -s, --shard <HOST:PORT[*WEIGHT]>  Add a shard (repeatable, default: {}:{})
        --hash <murmur|md5>           Ring hash (default: murmur)
        --key-tag <REGEX>             Custom key tag pattern with one capture group
        --no-key-tag                  Hash whole keys
    -t, --timeout <MS>                Read timeout in milliseconds (default: 2000)
    -a, --password <PASSWORD>         Send AUTH on connect
        --locate                      Print the owning shard and exit
    -v, --version                     Print version information
    -h, --help                        Print this help message

EXAMPLES:
    shardis -s 10.0.0.1:6379 -s 10.0.0.2:6379*2 user:{{42}}:name GET user:{{42}}:name
    shardis -s 10.0.0.1:6379 -s 10.0.0.2:6379 --locate user:{{42}}:name
    shardis queue BLPOP queue 0

LOGGING:
    Set RUST_LOG (e.g. RUST_LOG=shardis=debug) to see routing and connection events.
"#,
        shardis::DEFAULT_HOST,
        shardis::DEFAULT_PORT
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = match Config::from_args() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let mut router = AsyncRouter::new(&config.router_config())?;
    let key = config.key.as_bytes();
    let owner = router.shard_info(key);
    debug!(
        key = %config.key,
        tag = %String::from_utf8_lossy(router.key_tag(key)),
        shard = %owner.label(),
        "Resolved shard"
    );

    if config.locate {
        println!("{} (shard {})", owner, router.shard_index(key));
        return Ok(());
    }

    let command = config.command()?;
    info!(shard = %owner.label(), command = %command, "Executing");
    let result = router.execute(key, &command).await;
    router.disconnect_all().await;

    match result {
        Ok(reply) => println!("{}", reply),
        Err(e) => match e.connection_error() {
            Some(shardis::ConnectionError::Server(message)) => println!("(error) {}", message),
            _ => return Err(e.into()),
        },
    }

    Ok(())
}
