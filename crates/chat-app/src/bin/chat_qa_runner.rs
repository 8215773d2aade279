use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use snafu::{OptionExt, ResultExt, Snafu};

use quantalex::markdown::{Segment, parse_segments};
use quantalex::orchestrator::{ChatOrchestrator, SendFailure, SendReport};
use quantalex::scripted::ScriptedCompletionProvider;
use quantalex::session::{AuthError, AuthSession};
use quantalex::store::ConversationStore;
use quantalex_llm::{Completion, ProviderError};
use quantalex_storage::{
    ConversationId, IdentityId, JsonStorage, MessageRole, NewMessage, StorageError,
};

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
    root: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    ConversationCrud,
    TitleTruncation,
    PersistenceRoundtrip,
    SessionLifecycle,
    SendRoundtrip,
    SendFailureAbsorbed,
    MarkdownFixture,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "conversation_crud" => Some(Self::ConversationCrud),
            "title_truncation" => Some(Self::TitleTruncation),
            "persistence_roundtrip" => Some(Self::PersistenceRoundtrip),
            "session_lifecycle" => Some(Self::SessionLifecycle),
            "send_roundtrip" => Some(Self::SendRoundtrip),
            "send_failure_absorbed" => Some(Self::SendFailureAbsorbed),
            "markdown_fixture" => Some(Self::MarkdownFixture),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::ConversationCrud => "conversation_crud",
            Self::TitleTruncation => "title_truncation",
            Self::PersistenceRoundtrip => "persistence_roundtrip",
            Self::SessionLifecycle => "session_lifecycle",
            Self::SendRoundtrip => "send_roundtrip",
            Self::SendFailureAbsorbed => "send_failure_absorbed",
            Self::MarkdownFixture => "markdown_fixture",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("missing required --root argument for scenario '{scenario}'"))]
    MissingRoot {
        stage: &'static str,
        scenario: &'static str,
    },
    #[snafu(display("storage validation failed: {source}"))]
    StorageValidation {
        stage: &'static str,
        source: StorageError,
    },
    #[snafu(display("session validation failed: {source}"))]
    SessionValidation {
        stage: &'static str,
        source: AuthError,
    },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

async fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());
    if let Some(root) = args.root.as_deref() {
        println!("root={root}");
    }

    match args.scenario {
        Scenario::ConversationCrud => {
            run_conversation_crud(require_root(&args, "conversation_crud")?)
        }
        Scenario::TitleTruncation => run_title_truncation(require_root(&args, "title_truncation")?),
        Scenario::PersistenceRoundtrip => {
            run_persistence_roundtrip(require_root(&args, "persistence_roundtrip")?)
        }
        Scenario::SessionLifecycle => {
            run_session_lifecycle(require_root(&args, "session_lifecycle")?)
        }
        Scenario::SendRoundtrip => run_send_roundtrip(require_root(&args, "send_roundtrip")?).await,
        Scenario::SendFailureAbsorbed => {
            run_send_failure_absorbed(require_root(&args, "send_failure_absorbed")?).await
        }
        Scenario::MarkdownFixture => run_markdown_fixture(),
        Scenario::All => run_all(require_root(&args, "all")?).await,
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut root = None;
    let mut pending = args.into_iter();

    // The parser is intentionally strict to keep scenario execution deterministic in CI.
    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            "--root" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-root-value",
                    arg: "--root",
                })?;
                root = Some(value);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
        root,
    })
}

async fn run_all(root: &str) -> RunnerResult<()> {
    run_conversation_crud(root)?;
    run_title_truncation(root)?;
    run_persistence_roundtrip(root)?;
    run_session_lifecycle(root)?;
    run_send_roundtrip(root).await?;
    run_send_failure_absorbed(root).await?;
    run_markdown_fixture()?;
    Ok(())
}

fn run_conversation_crud(root: &str) -> RunnerResult<()> {
    let mut store = fresh_store(root, "conversation_crud")?;

    let first = store.create_conversation().context(StorageValidationSnafu {
        stage: "scenario-crud-create-first",
    })?;
    let second = store.create_conversation().context(StorageValidationSnafu {
        stage: "scenario-crud-create-second",
    })?;

    ensure_scenario(
        store.conversations().len() == 2 && store.conversations()[0].id == second,
        "conversation_crud",
        "new conversations must be inserted newest-first",
    )?;

    store.select_conversation(first);
    store.select_conversation(ConversationId::new_v7());
    ensure_scenario(
        store.active_id() == Some(first),
        "conversation_crud",
        "unknown selection targets must be ignored",
    )?;

    store
        .delete_conversation(first)
        .context(StorageValidationSnafu {
            stage: "scenario-crud-delete-active",
        })?;
    ensure_scenario(
        store.active_id().is_none(),
        "conversation_crud",
        "deleting the active conversation must clear the selection",
    )?;

    store.clear_all().context(StorageValidationSnafu {
        stage: "scenario-crud-clear-all",
    })?;
    ensure_scenario(
        store.conversations().is_empty(),
        "conversation_crud",
        "clear_all must empty the collection",
    )?;

    println!("conversation_crud=true");
    println!("runner_ok=true");
    Ok(())
}

fn run_title_truncation(root: &str) -> RunnerResult<()> {
    let mut store = fresh_store(root, "title_truncation")?;

    let id = store.create_conversation().context(StorageValidationSnafu {
        stage: "scenario-title-create",
    })?;
    let long_utterance = "a".repeat(80);
    store
        .append_message(id, NewMessage::user(long_utterance))
        .context(StorageValidationSnafu {
            stage: "scenario-title-append",
        })?;

    let title = store
        .conversation(id)
        .map(|conversation| conversation.title.clone())
        .unwrap_or_default();
    ensure_scenario(
        title.chars().count() == 53 && title.ends_with("..."),
        "title_truncation",
        "an 80-character utterance must derive a 50-character title plus marker",
    )?;

    println!("title_truncation=true");
    println!("runner_ok=true");
    Ok(())
}

fn run_persistence_roundtrip(root: &str) -> RunnerResult<()> {
    let storage = Arc::new(JsonStorage::new(scenario_root(root, "persistence_roundtrip")));
    let identity_id = IdentityId::new_v7();

    let mut store =
        ConversationStore::load(storage.clone(), identity_id).context(StorageValidationSnafu {
            stage: "scenario-roundtrip-load",
        })?;
    let id = store.create_conversation().context(StorageValidationSnafu {
        stage: "scenario-roundtrip-create",
    })?;
    store
        .append_message(id, NewMessage::user("What is a lien?"))
        .context(StorageValidationSnafu {
            stage: "scenario-roundtrip-append-user",
        })?;
    store
        .append_message(
            id,
            NewMessage::assistant("A lien is a claim...", Some("definition".to_string())),
        )
        .context(StorageValidationSnafu {
            stage: "scenario-roundtrip-append-assistant",
        })?;
    let before = store.conversations().to_vec();

    let reloaded =
        ConversationStore::load(storage, identity_id).context(StorageValidationSnafu {
            stage: "scenario-roundtrip-reload",
        })?;
    ensure_scenario(
        reloaded.conversations() == before.as_slice(),
        "persistence_roundtrip",
        "reloaded collection must equal the persisted one",
    )?;

    println!("persistence_roundtrip=true");
    println!("runner_ok=true");
    Ok(())
}

fn run_session_lifecycle(root: &str) -> RunnerResult<()> {
    let storage = Arc::new(JsonStorage::new(scenario_root(root, "session_lifecycle")));
    let mut session = AuthSession::new(storage);

    let identity = session
        .login("qa@example.com", "password")
        .context(SessionValidationSnafu {
            stage: "scenario-session-login",
        })?;
    ensure_scenario(
        identity.name == "Qa",
        "session_lifecycle",
        "login must derive the display name from the email local part",
    )?;

    session.logout().context(SessionValidationSnafu {
        stage: "scenario-session-logout",
    })?;
    ensure_scenario(
        session.identity().is_none(),
        "session_lifecycle",
        "logout must deactivate the identity",
    )?;

    let duplicate = session.signup("qa@example.com", "password", "QA Tester");
    ensure_scenario(
        matches!(duplicate, Err(AuthError::DuplicateAccount { .. })),
        "session_lifecycle",
        "signup must reject an email that logged in before",
    )?;

    println!("session_lifecycle=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_send_roundtrip(root: &str) -> RunnerResult<()> {
    let mut store = fresh_store(root, "send_roundtrip")?;
    let provider = Arc::new(ScriptedCompletionProvider::new());
    provider.push_success(Completion {
        content: "Hello!".to_string(),
        reasoning: Some("greeting".to_string()),
        usage: None,
    });
    let mut orchestrator = ChatOrchestrator::new(provider.clone());

    let report = orchestrator
        .send(&mut store, "Hi")
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-send-dispatch",
        })?;

    let SendReport::Completed {
        conversation_id,
        failure: None,
    } = report
    else {
        return ScenarioFailedSnafu {
            stage: "scenario-send-report",
            scenario: "send_roundtrip",
            reason: "expected a clean completed send".to_string(),
        }
        .fail();
    };

    let conversation = store.conversation(conversation_id);
    let shape_ok = conversation.is_some_and(|conversation| {
        conversation.title == "Hi"
            && conversation.messages.len() == 2
            && conversation.messages[0].role == MessageRole::User
            && conversation.messages[1].role == MessageRole::Assistant
            && conversation.messages[1].reasoning.as_deref() == Some("greeting")
    });
    ensure_scenario(
        shape_ok,
        "send_roundtrip",
        "send must auto-create a titled conversation holding user then assistant",
    )?;
    ensure_scenario(
        provider.request_count() == 1 && !orchestrator.is_loading(),
        "send_roundtrip",
        "exactly one request must be issued and the in-flight flag released",
    )?;

    println!("send_roundtrip=true");
    println!("runner_ok=true");
    Ok(())
}

async fn run_send_failure_absorbed(root: &str) -> RunnerResult<()> {
    let mut store = fresh_store(root, "send_failure_absorbed")?;
    let provider = Arc::new(ScriptedCompletionProvider::new());
    provider.push_failure(ProviderError::CompletionStatus {
        stage: "completion-http-status",
        status: 401,
        body: "invalid key".to_string(),
    });
    let mut orchestrator = ChatOrchestrator::new(provider);

    let report = orchestrator
        .send(&mut store, "Hi")
        .await
        .context(StorageValidationSnafu {
            stage: "scenario-failure-dispatch",
        })?;

    let SendReport::Completed {
        conversation_id,
        failure: Some(SendFailure::Unauthorized),
    } = report
    else {
        return ScenarioFailedSnafu {
            stage: "scenario-failure-report",
            scenario: "send_failure_absorbed",
            reason: "expected a completed send carrying an unauthorized failure".to_string(),
        }
        .fail();
    };

    let transcript_ok = store.conversation(conversation_id).is_some_and(|conversation| {
        conversation.messages.len() == 2
            && conversation.messages[0].content == "Hi"
            && conversation.messages[1].content.contains("Authentication failed")
    });
    ensure_scenario(
        transcript_ok,
        "send_failure_absorbed",
        "the user turn must survive and the failure must render as transcript text",
    )?;

    println!("send_failure_absorbed=true");
    println!("runner_ok=true");
    Ok(())
}

fn run_markdown_fixture() -> RunnerResult<()> {
    let fixture = "# Ruling\nThe clause is **void**, see `s.12`.\n```text\nquoted\n```";
    let segments = parse_segments(fixture);

    let shape_ok = matches!(
        segments.as_slice(),
        [
            Segment::Header { level: 1, .. },
            Segment::Plain { .. },
            Segment::Bold { .. },
            Segment::Plain { .. },
            Segment::InlineCode { .. },
            Segment::Plain { .. },
            Segment::CodeBlock { .. },
        ]
    );
    ensure_scenario(
        shape_ok,
        "markdown_fixture",
        "fixture must lex into header, emphasized prose and a code block",
    )?;
    ensure_scenario(
        segments == parse_segments(fixture),
        "markdown_fixture",
        "lexing must be deterministic",
    )?;

    println!("markdown_fixture=true");
    println!("runner_ok=true");
    Ok(())
}

fn fresh_store(root: &str, scenario: &'static str) -> RunnerResult<ConversationStore> {
    let storage = Arc::new(JsonStorage::new(scenario_root(root, scenario)));
    ConversationStore::load(storage, IdentityId::new_v7()).context(StorageValidationSnafu {
        stage: "scenario-fresh-store-load",
    })
}

fn require_root<'a>(args: &'a RunnerArgs, scenario: &'static str) -> RunnerResult<&'a str> {
    args.root.as_deref().context(MissingRootSnafu {
        stage: "require-root",
        scenario,
    })
}

fn scenario_root(root: &str, scenario: &str) -> PathBuf {
    PathBuf::from(root).join(scenario)
}

fn ensure_scenario(
    condition: bool,
    scenario: &'static str,
    reason: &str,
) -> RunnerResult<()> {
    if condition {
        return Ok(());
    }

    ScenarioFailedSnafu {
        stage: "scenario-check",
        scenario,
        reason: reason.to_string(),
    }
    .fail()
}
