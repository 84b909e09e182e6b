use std::fmt::Write as _;
use std::io::{self, Read};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::ai::{AiAction, AiStatus, RequestOutcome};
use crate::app::Workspace;
use crate::editing::CommitEvent;
use crate::notes::{Note, NoteId, NoteStore};

/// Extra time granted on top of the HTTP timeout before giving up on a reply.
pub const AI_WAIT_SLACK: Duration = Duration::from_secs(5);

const SHORT_ID_LEN: usize = 8;

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Case-insensitive search over titles and content
    #[arg()]
    pub query: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Title for the note
    #[arg(long)]
    pub title: Option<String>,
    /// Provide the note body inline. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Note id or any unique prefix of it
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note id or any unique prefix of it
    pub id: String,
    /// Replace the title
    #[arg(long)]
    pub title: Option<String>,
    /// Replace the content
    #[arg(long)]
    pub content: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct AiArgs {
    /// Which transformation to run
    #[arg(value_enum)]
    pub action: AiAction,
    /// Note id or any unique prefix of it
    pub id: String,
}

pub fn list_notes(workspace: &mut Workspace, args: &ListArgs) -> Result<String> {
    workspace.set_query(args.query.join(" "));
    Ok(format_note_list(&workspace.visible_notes()))
}

pub fn new_note(
    workspace: &mut Workspace,
    title: Option<String>,
    content: Option<String>,
) -> Result<String> {
    let note = workspace.create_note()?;
    if let Some(title) = title {
        workspace.edit_title(title.trim());
    }
    if let Some(content) = content {
        workspace.edit_content(content);
    }
    ensure_committed(workspace.flush())?;
    Ok(format!("Created note {}\n", note.id))
}

pub fn show_note(workspace: &Workspace, raw_id: &str) -> Result<String> {
    let id = resolve_id(workspace.store(), raw_id)?;
    let note = workspace
        .store()
        .get(id)
        .with_context(|| format!("note {id} disappeared"))?;
    Ok(format_note(note))
}

pub fn edit_note(workspace: &mut Workspace, args: EditArgs) -> Result<String> {
    if args.title.is_none() && args.content.is_none() {
        bail!("nothing to change; pass --title and/or --content");
    }
    let id = resolve_id(workspace.store(), &args.id)?;
    workspace.select_note(id);
    if let Some(title) = args.title {
        workspace.edit_title(title.trim());
    }
    if let Some(content) = args.content {
        workspace.edit_content(content);
    }
    let events = workspace.flush();
    let changed = !events.is_empty();
    ensure_committed(events)?;
    if changed {
        Ok(format!("Updated note {}\n", short_id(id)))
    } else {
        Ok(format!("No changes to note {}\n", short_id(id)))
    }
}

pub fn delete_note(workspace: &mut Workspace, raw_id: &str) -> Result<String> {
    let id = resolve_id(workspace.store(), raw_id)?;
    let title = workspace
        .store()
        .get(id)
        .map(|note| note.display_title().to_string())
        .unwrap_or_default();
    workspace.delete_note(id)?;
    Ok(format!("Deleted note {} ({title})\n", short_id(id)))
}

pub fn run_ai(workspace: &mut Workspace, args: AiArgs, timeout: Duration) -> Result<String> {
    let id = resolve_id(workspace.store(), &args.id)?;
    workspace.select_note(id);
    match workspace.run_ai(args.action) {
        RequestOutcome::Started(request_id) => {
            tracing::debug!(request_id, action = %args.action, "waiting for AI reply");
            workspace.wait_for_ai(timeout);
        }
        RequestOutcome::Skipped => {
            return Ok(format!("Note {} is empty; nothing to {}.\n", short_id(id), args.action));
        }
        RequestOutcome::Busy => bail!("another AI action is still running for this note"),
        RequestOutcome::Unavailable => {}
    }

    let state = workspace.ai_state().clone();
    let message = state.message.unwrap_or_default();
    match state.status {
        AiStatus::Success => {
            let note = workspace
                .store()
                .get(id)
                .with_context(|| format!("note {id} disappeared"))?;
            Ok(format!("{message}\n\n{}", format_note(note)))
        }
        AiStatus::Error => bail!("{message}"),
        AiStatus::Loading => bail!("no reply from the AI service within {timeout:?}"),
        AiStatus::Idle => bail!("AI action finished without a result"),
    }
}

/// Turns failed commits into an error naming every affected field.
pub fn ensure_committed(events: Vec<CommitEvent>) -> Result<()> {
    let failures: Vec<String> = events
        .into_iter()
        .filter_map(|event| match event {
            CommitEvent::Failed { field, message, .. } => Some(format!("{field}: {message}")),
            CommitEvent::Committed { .. } => None,
        })
        .collect();
    if !failures.is_empty() {
        bail!("failed to save note ({})", failures.join("; "));
    }
    Ok(())
}

pub fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading note content from stdin")?;
    Ok(Some(buf))
}

/// Matches a full id or a unique, case-insensitive prefix of one.
fn resolve_id(store: &NoteStore, raw: &str) -> Result<NoteId> {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        bail!("note id cannot be empty");
    }
    let matches: Vec<NoteId> = store
        .all()
        .iter()
        .map(|note| note.id)
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => bail!("no note matches '{raw}'"),
        _ => bail!("'{raw}' is ambiguous ({} notes match)", matches.len()),
    }
}

fn format_note_list(notes: &[&Note]) -> String {
    if notes.is_empty() {
        return "No notes found.\n".to_string();
    }
    let mut out = String::new();
    for note in notes {
        let _ = writeln!(
            &mut out,
            "{}  {}  {}",
            short_id(note.id),
            format_timestamp(note.updated_at),
            note.display_title()
        );
    }
    out
}

fn format_note(note: &Note) -> String {
    let mut out = String::new();
    let _ = writeln!(&mut out, "{}", note.display_title());
    let _ = writeln!(&mut out, "id       {}", note.id);
    let _ = writeln!(&mut out, "updated  {}", format_timestamp(note.updated_at));
    if !note.content.is_empty() {
        out.push('\n');
        out.push_str(&note.content);
        if !note.content.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

fn short_id(id: NoteId) -> String {
    id.to_string().chars().take(SHORT_ID_LEN).collect()
}

fn format_timestamp(epoch_ms: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| epoch_ms.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::ai::testing::ScriptedGateway;
    use crate::clock::ManualClock;
    use crate::config::AppConfig;
    use crate::storage::test_support::init_storage;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    const NOW: i64 = 1_700_000_000_000;

    fn setup() -> TestResult<(TempDir, ScriptedGateway, Workspace)> {
        let (temp, storage) = init_storage()?;
        let gateway = ScriptedGateway::new();
        let workspace = Workspace::open(
            &AppConfig::default(),
            storage,
            Arc::new(gateway.clone()),
            Arc::new(ManualClock::new(NOW)),
        );
        Ok((temp, gateway, workspace))
    }

    fn fixed_note(id: &str, title: &str, content: &str, updated_at: i64) -> TestResult<Note> {
        Ok(Note {
            id: id.parse()?,
            title: title.into(),
            content: content.into(),
            updated_at,
        })
    }

    #[test]
    fn note_list_formatting() -> TestResult {
        let groceries = fixed_note(
            "1f0e8c2a-0000-4000-8000-000000000001",
            "Groceries",
            "milk",
            NOW,
        )?;
        let blank = fixed_note("9b7d33c4-0000-4000-8000-000000000002", "", "", 0)?;

        insta::assert_snapshot!(format_note_list(&[&groceries, &blank]), @r###"
        1f0e8c2a  2023-11-14T22:13:20Z  Groceries
        9b7d33c4  1970-01-01T00:00:00Z  Untitled Note
        "###);
        assert_eq!(format_note_list(&[]), "No notes found.\n");
        Ok(())
    }

    #[test]
    fn single_note_formatting() -> TestResult {
        let note = fixed_note(
            "1f0e8c2a-0000-4000-8000-000000000001",
            "Trip",
            "pack bags\nbook hotel",
            NOW,
        )?;
        insta::assert_snapshot!(format_note(&note), @r###"
        Trip
        id       1f0e8c2a-0000-4000-8000-000000000001
        updated  2023-11-14T22:13:20Z

        pack bags
        book hotel
        "###);
        Ok(())
    }

    #[test]
    fn new_then_list_with_query() -> TestResult {
        let (_temp, _gateway, mut workspace) = setup()?;
        new_note(&mut workspace, Some(" Groceries ".into()), Some("milk, eggs".into()))?;
        new_note(&mut workspace, Some("Standup".into()), None)?;

        let all = list_notes(&mut workspace, &ListArgs { query: vec![] })?;
        let lines: Vec<&str> = all.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("Standup"));
        assert!(lines[1].ends_with("Groceries"));

        let filtered = list_notes(
            &mut workspace,
            &ListArgs {
                query: vec!["EGGS".into()],
            },
        )?;
        assert_eq!(filtered.lines().count(), 1);
        assert!(filtered.contains("Groceries"));
        Ok(())
    }

    #[test]
    fn ids_resolve_by_unique_prefix() -> TestResult {
        let (_temp, _gateway, mut workspace) = setup()?;
        let note = workspace.create_note()?;
        let full = note.id.to_string();

        assert_eq!(resolve_id(workspace.store(), &full[..6].to_uppercase())?, note.id);
        assert!(resolve_id(workspace.store(), "zzzz").is_err());
        assert!(resolve_id(workspace.store(), "  ").is_err());

        workspace.create_note()?;
        let err = resolve_id(workspace.store(), "").unwrap_err();
        assert!(err.to_string().contains("empty"));
        Ok(())
    }

    #[test]
    fn edit_reports_unchanged_fields() -> TestResult {
        let (_temp, _gateway, mut workspace) = setup()?;
        let note = workspace.create_note()?;
        let id = note.id.to_string();

        let out = edit_note(
            &mut workspace,
            EditArgs {
                id: id.clone(),
                title: Some("Plan".into()),
                content: None,
            },
        )?;
        assert!(out.starts_with("Updated note"));
        assert_eq!(workspace.store().get(note.id).map(|n| n.title.as_str()), Some("Plan"));

        let out = edit_note(
            &mut workspace,
            EditArgs {
                id: id.clone(),
                title: Some("  Plan \n".into()),
                content: None,
            },
        )?;
        assert!(out.starts_with("No changes"));
        assert_eq!(workspace.store().get(note.id).map(|n| n.title.as_str()), Some("Plan"));

        let err = edit_note(
            &mut workspace,
            EditArgs {
                id,
                title: None,
                content: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("nothing to change"));
        Ok(())
    }

    #[test]
    fn ai_summary_is_appended_and_printed() -> TestResult {
        let (_temp, gateway, mut workspace) = setup()?;
        new_note(&mut workspace, None, Some("long meeting notes".into()))?;
        let id = workspace.store().all()[0].id;
        gateway.reply("- decided things");

        let out = run_ai(
            &mut workspace,
            AiArgs {
                action: AiAction::Summarize,
                id: id.to_string(),
            },
            Duration::from_secs(5),
        )?;
        assert!(out.starts_with("Summary added!\n"));
        assert_eq!(
            workspace.store().get(id).map(|n| n.content.as_str()),
            Some("long meeting notes\n\n## AI Summary\n- decided things")
        );
        Ok(())
    }

    #[test]
    fn ai_failure_and_blank_note() -> TestResult {
        let (_temp, gateway, mut workspace) = setup()?;
        let blank = workspace.create_note()?;
        let out = run_ai(
            &mut workspace,
            AiArgs {
                action: AiAction::Polish,
                id: blank.id.to_string(),
            },
            Duration::from_secs(5),
        )?;
        assert!(out.contains("is empty"));
        assert!(gateway.calls().is_empty());

        workspace.edit_content("some text");
        gateway.fail("quota");
        let result = run_ai(
            &mut workspace,
            AiArgs {
                action: AiAction::GenerateTitle,
                id: blank.id.to_string(),
            },
            Duration::from_secs(5),
        );
        assert_matches!(result, Err(ref err) if err.to_string() == "Failed to generate title.");
        Ok(())
    }

    #[test]
    fn delete_prints_title() -> TestResult {
        let (_temp, _gateway, mut workspace) = setup()?;
        new_note(&mut workspace, Some("Old".into()), None)?;
        let id = workspace.store().all()[0].id;

        let out = delete_note(&mut workspace, &id.to_string())?;
        assert_eq!(out, format!("Deleted note {} (Old)\n", short_id(id)));
        assert!(workspace.store().is_empty());
        Ok(())
    }
}
