use std::io::{self, Write};

use color_eyre::{eyre::eyre, Result};
use ghsm_core::{
    batch::{BatchRunner, Summary},
    error::BatchError,
    model::Scope,
    store::{Encryptor, KeyProvider, SecretUpserter},
};
use ghsm_crypto::sealed_box::SealedBoxEncryptor;
use ghsm_github::GitHubClient;
use tracing::{info, warn};

use crate::{
    cli::{PushArgs, ScopeKind, VisibilityArg},
    config,
    input::{self, InputRecord},
    report,
};

/// Push every secret in the input file. Returns `false` when any record failed.
pub async fn run(args: &PushArgs, cfg: &config::Config) -> Result<bool> {
    let scope = args.scope()?;
    warn_ignored_flags(args);

    let token = config::resolve_token(cfg, &args.token_env, |key| std::env::var(key).ok())
        .ok_or_else(|| {
            eyre!(
                "no GitHub token found; set {} or `token` in the config file",
                args.token_env
            )
        })?;

    let records = input::load_records(&args.file)?;
    info!(count = records.len(), %scope, "loaded records");

    let client = GitHubClient::new(&cfg.github_config(token, args.api_base.clone()))?;
    let runner = BatchRunner::new(client.clone(), SealedBoxEncryptor, client);

    let mut out = io::stdout();
    execute(&runner, &scope, records, args.json, &mut out).await
}

/// Run the batch and print its report. Batch-fatal errors are printed with any
/// outcomes completed before them, then returned.
pub async fn execute<K, E, U>(
    runner: &BatchRunner<K, E, U>,
    scope: &Scope,
    records: Vec<InputRecord>,
    json: bool,
    out: &mut impl Write,
) -> Result<bool>
where
    K: KeyProvider,
    E: Encryptor,
    U: SecretUpserter,
{
    let (outcomes, error) = match runner.run(scope, records).await {
        Ok(outcomes) => (outcomes, None),
        Err(err) => {
            let completed = match &err {
                BatchError::Seal { completed, .. } => completed.clone(),
                BatchError::KeyFetch(_) => Vec::new(),
            };
            (completed, Some(err))
        }
    };

    let message = error.as_ref().map(|e| e.to_string());
    if json {
        report::write_json(out, scope, &outcomes, message.as_deref())?;
    } else {
        report::write_text(out, scope, &outcomes, message.as_deref())?;
    }

    if let Some(err) = error {
        return Err(eyre!(err));
    }
    Ok(Summary::from_outcomes(&outcomes).failed == 0)
}

fn warn_ignored_flags(args: &PushArgs) {
    if args.kind == ScopeKind::Org && args.repo.is_some() {
        warn!("--repo is ignored with --type org");
    }
    if args.kind == ScopeKind::Repo && args.visibility != VisibilityArg::Private {
        warn!("--visibility only applies to organization secrets");
    }
    if args.visibility != VisibilityArg::Selected && !args.selected_repos.is_empty() {
        warn!("--selected-repo only applies with --visibility selected");
    }
}
