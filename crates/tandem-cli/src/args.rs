use std::path::PathBuf;

use clap::Parser;

use tandem_client::SyncConfig;

#[derive(Debug, Parser)]
#[command(name = "tandem")]
#[command(about = "Headless Tandem client: opens one conversation and follows it")]
#[command(version)]
pub struct Args {
    /// Conversation key or deep link, e.g. `alice`, `/chat/alice`, `club_12/7`.
    pub route: String,

    /// Send this text once the conversation is open.
    #[arg(long)]
    pub send: Option<String>,

    /// Attach a file to the message given with `--send`. Repeatable.
    #[arg(long = "attach", value_name = "PATH")]
    pub attachments: Vec<PathBuf>,

    /// Signed-in user login. Overrides `TANDEM_USER_ID`.
    #[arg(long)]
    pub user: Option<String>,

    /// Bearer token. Overrides `TANDEM_TOKEN`.
    #[arg(long)]
    pub token: Option<String>,

    /// REST base URL. Overrides `TANDEM_API_URL`.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Push WebSocket URL. Overrides `TANDEM_PUSH_URL`.
    #[arg(long)]
    pub push_url: Option<String>,

    /// Exit once the send resolves instead of following the conversation.
    #[arg(long)]
    pub once: bool,
}

impl Args {
    /// Command-line flags win over the environment.
    pub fn apply(&self, config: &mut SyncConfig) {
        if let Some(user) = &self.user {
            config.user_id = Some(user.clone());
        }
        if let Some(token) = &self.token {
            config.token = Some(token.clone());
        }
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(url) = &self.push_url {
            config.push_url = url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_environment() {
        let args = Args::parse_from([
            "tandem",
            "/chat/alice",
            "--send",
            "hi",
            "--attach",
            "a.png",
            "--attach",
            "b.png",
            "--user",
            "me",
        ]);
        assert_eq!(args.route, "/chat/alice");
        assert_eq!(args.attachments.len(), 2);

        let mut config = SyncConfig {
            user_id: Some("someone-else".into()),
            ..SyncConfig::default()
        };
        args.apply(&mut config);
        assert_eq!(config.user_id.as_deref(), Some("me"));
        assert_eq!(config.api_url, SyncConfig::default().api_url);
    }
}
