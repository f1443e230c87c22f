use std::process::ExitCode;

use anyhow::Result;
use gitnotes_app::NoteStore;
use gitnotes_core::note::now_millis;
use gitnotes_core::{Note, NoteId};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::NoteAction;

pub fn run(action: NoteAction, store: &impl NoteStore) -> Result<ExitCode> {
    match action {
        NoteAction::Add { title, body } => {
            let id = store.insert(Note::new(title, body))?;
            println!("Added note {id}");
        }
        NoteAction::Edit { id, title, body } => {
            let id = NoteId::new(id);
            let Some(note) = edit(store, id, title, body)? else {
                eprintln!("No note with id {id}");
                return Ok(ExitCode::FAILURE);
            };
            println!("Updated note {}", note.id);
        }
        NoteAction::Ls => {
            for note in store.list()? {
                println!("{}", list_line(&note));
            }
        }
        NoteAction::Rm { id } => {
            let id = NoteId::new(id);
            if !store.delete(id)? {
                eprintln!("No note with id {id}");
                return Ok(ExitCode::FAILURE);
            }
            println!("Removed note {id}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Rewrite the note in place, keeping its id and creation time.
fn edit(
    store: &impl NoteStore,
    id: NoteId,
    title: Option<String>,
    body: Option<String>,
) -> Result<Option<Note>> {
    let Some(mut note) = store.list()?.into_iter().find(|note| note.id == id) else {
        return Ok(None);
    };
    if let Some(title) = title {
        note.title = title;
    }
    if let Some(body) = body {
        note.body = body;
    }
    note.updated_at = now_millis();

    store.delete(id)?;
    store.insert(note.clone())?;
    Ok(Some(note))
}

fn list_line(note: &Note) -> String {
    format!("{}\t{}\t{}", note.id, timestamp(note.updated_at), note.title)
}

fn timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitnotes_app::JsonNoteStore;
    use tempfile::tempdir;
    use time::macros::datetime;

    #[test]
    fn add_then_remove() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonNoteStore::open(dir.path());

        let code = run(
            NoteAction::Add {
                title: "Groceries".into(),
                body: "milk".into(),
            },
            &store,
        )?;
        assert_eq!(code, ExitCode::SUCCESS);
        let notes = store.list()?;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, NoteId::new(1));

        assert_eq!(run(NoteAction::Rm { id: 1 }, &store)?, ExitCode::SUCCESS);
        assert!(store.list()?.is_empty());
        assert_eq!(run(NoteAction::Rm { id: 1 }, &store)?, ExitCode::FAILURE);
        Ok(())
    }

    #[test]
    fn edit_keeps_id_and_creation_time() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonNoteStore::open(dir.path());
        store.insert(Note::new("first", "a"))?;
        let id = store.insert(Note::new("second", "b"))?;
        let created = store.list()?[1].created_at;

        let code = run(
            NoteAction::Edit {
                id: id.0,
                title: None,
                body: Some("rewritten".into()),
            },
            &store,
        )?;
        assert_eq!(code, ExitCode::SUCCESS);

        let notes = store.list()?;
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[1].id, id);
        assert_eq!(notes[1].title, "second");
        assert_eq!(notes[1].body, "rewritten");
        assert_eq!(notes[1].created_at, created);
        Ok(())
    }

    #[test]
    fn edit_of_missing_note_fails() -> Result<()> {
        let dir = tempdir()?;
        let store = JsonNoteStore::open(dir.path());
        let code = run(
            NoteAction::Edit {
                id: 7,
                title: Some("x".into()),
                body: None,
            },
            &store,
        )?;
        assert_eq!(code, ExitCode::FAILURE);
        Ok(())
    }

    #[test]
    fn list_line_uses_rfc3339() {
        let mut note = Note::new("Groceries", "").with_id(NoteId::new(3));
        note.updated_at = datetime!(2024-05-01 12:30:00 UTC);
        assert_eq!(list_line(&note), "3\t2024-05-01T12:30:00Z\tGroceries");
    }
}
