use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use serverville_client::{
    Client, ClientConfig, ClientError, CreateAnonymousAccount, DataValue, Driver, JoinChannelRequest, Pending, PushMessage,
    SignInReply,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("timed out waiting for the server")]
    Timeout,
    #[error("not signed in; run `sign-in` or `anonymous` first")]
    NotSignedIn,
    #[error("pass --username or --email")]
    MissingIdentity,
}

#[derive(Parser, Debug)]
#[command(name = "serverville", about = "Serverville RPC client")]
struct Cli {
    #[arg(long, env = "SERVERVILLE_URL", default_value = "ws://127.0.0.1:8000")]
    url: String,

    /// Persist the session id here so later commands stay signed in.
    #[arg(long, env = "SERVERVILLE_SESSION_FILE")]
    session_file: Option<PathBuf>,

    /// Log every frame sent and received (at debug level).
    #[arg(long, env = "SERVERVILLE_LOG_MESSAGES", default_value_t = false)]
    log_messages: bool,

    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the server clock.
    Ping,
    /// Issue one raw call and print the reply.
    Call {
        api: String,
        #[arg(default_value = "{}")]
        body: String,
    },
    SignIn {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, env = "SERVERVILLE_PASSWORD")]
        password: String,
    },
    /// Create an anonymous account and sign in to it.
    Anonymous,
    SignOut,
    /// Show the user behind the persisted session.
    Whoami,
    GetKey {
        key: String,
    },
    SetKey {
        key: String,
        /// JSON value; stored with the matching type tag.
        value: String,
    },
    /// Join a channel and print pushes until interrupted.
    Listen {
        channel: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env();
    config.server_url = cli.url;
    config.session_file = cli.session_file;
    config.log_messages = cli.log_messages;

    let client = Client::builder(config).build();
    let driver = Driver::spawn(client.clone());
    let timeout = Duration::from_secs(cli.timeout_secs);

    let user = wait(timeout, client.init()).await?;
    let result = run(&client, user, cli.command, timeout).await;

    client.close();
    driver.shutdown().await;
    result
}

async fn run(client: &Client, user: Option<SignInReply>, command: Command, timeout: Duration) -> Result<(), CliError> {
    match command {
        Command::Ping => {
            let time = wait(timeout, client.get_time()).await?;
            println!("{}", time.time);
            Ok(())
        }
        Command::Call { api, body } => {
            let body: Value = serde_json::from_str(&body)?;
            let reply: Value = wait(timeout, client.call(&api, &body)).await?;
            print_json(&reply)
        }
        Command::SignIn { username, email, password } => {
            if username.is_none() && email.is_none() {
                return Err(CliError::MissingIdentity);
            }
            let reply = wait(timeout, client.sign_in_with(username.as_deref(), email.as_deref(), &password)).await?;
            print_json(&serde_json::to_value(reply)?)
        }
        Command::Anonymous => {
            let reply = wait(timeout, client.create_anonymous_account(&CreateAnonymousAccount::default())).await?;
            print_json(&serde_json::to_value(reply)?)
        }
        Command::SignOut => {
            client.sign_out();
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            let user = user.ok_or(CliError::NotSignedIn)?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::GetKey { key } => {
            require_session(user.as_ref())?;
            let item = wait(timeout, client.get_user_key(&key)).await?;
            print_json(&serde_json::to_value(item)?)
        }
        Command::SetKey { key, value } => {
            require_session(user.as_ref())?;
            let value = data_value(serde_json::from_str(&value)?);
            let reply = wait(timeout, client.set_user_key(&key, &value)).await?;
            println!("updated at {}", reply.updated_at);
            Ok(())
        }
        Command::Listen { channel } => {
            client.on_any_push(Some(std::sync::Arc::new(|message: &PushMessage| {
                println!("{} from={} via={} {}", message.message_type, message.from_id, message.via_channel, message.payload);
            })));
            if let Some(channel) = channel {
                require_session(user.as_ref())?;
                wait(timeout, client.join_channel_as(&channel, None, None)).await?;
                let request = JoinChannelRequest { channel_id: channel, ..JoinChannelRequest::default() };
                let info = wait(timeout, client.get_channel_info(&request)).await?;
                eprintln!("joined {} ({} members)", info.channel_id, info.members.len());
            }
            let _ = tokio::signal::ctrl_c().await;
            Ok(())
        }
    }
}

async fn wait<T>(timeout: Duration, call: Pending<T>) -> Result<T, CliError> {
    tokio::time::timeout(timeout, call).await.map_err(|_| CliError::Timeout)?.map_err(CliError::from)
}

fn require_session(user: Option<&SignInReply>) -> Result<(), CliError> {
    user.map(|_| ()).ok_or(CliError::NotSignedIn)
}

fn data_value(value: Value) -> DataValue {
    match value {
        Value::Null => DataValue::Null,
        Value::Bool(b) => DataValue::Boolean(b),
        Value::Number(n) => DataValue::Number(n.as_f64().unwrap_or_default()),
        Value::String(s) => DataValue::String(s),
        Value::Object(map) => DataValue::Object(map),
        other @ Value::Array(_) => DataValue::Json(other),
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
