use anyhow::Result;

use crate::args::{BaseArgs, DEFAULT_HOST};
use crate::config::{self, Config};

/// Resolved server and credentials for API calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginContext {
    pub host: String,
    pub org: Option<String>,
    pub token: Option<String>,
    /// Default bucket for commands that take an optional `--bucket`.
    pub bucket: Option<String>,
}

/// Flags and environment win over config files, which win over defaults.
pub fn resolve(base: &BaseArgs) -> Result<LoginContext> {
    let config = config::load()?;
    Ok(resolve_with(base, config))
}

fn resolve_with(base: &BaseArgs, config: Config) -> LoginContext {
    let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

    LoginContext {
        host: non_empty(&base.host)
            .or_else(|| non_empty(&config.host))
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        org: non_empty(&base.org).or_else(|| non_empty(&config.org)),
        token: non_empty(&base.token).or_else(|| non_empty(&config.token)),
        bucket: non_empty(&config.bucket),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BaseArgs {
        BaseArgs {
            json: false,
            host: None,
            org: None,
            token: None,
            verbose: false,
            env_file: None,
        }
    }

    #[test]
    fn defaults_to_local_server() {
        let ctx = resolve_with(&base(), Config::default());
        assert_eq!(ctx.host, DEFAULT_HOST);
        assert_eq!(ctx.org, None);
        assert_eq!(ctx.token, None);
    }

    #[test]
    fn flags_override_config() {
        let args = BaseArgs {
            host: Some("http://flag:8086".into()),
            org: Some("".into()),
            ..base()
        };
        let config = Config {
            host: Some("http://file:8086".into()),
            org: Some("file-org".into()),
            token: Some("file-token".into()),
            bucket: Some("telegraf".into()),
            ..Default::default()
        };

        let ctx = resolve_with(&args, config);
        assert_eq!(ctx.host, "http://flag:8086");
        assert_eq!(ctx.org.as_deref(), Some("file-org"));
        assert_eq!(ctx.token.as_deref(), Some("file-token"));
        assert_eq!(ctx.bucket.as_deref(), Some("telegraf"));
    }
}
