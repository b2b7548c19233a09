//! Console commands parsed from one input line.

use std::path::PathBuf;

use anyhow::{anyhow, bail};
use shared::domain::Category;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Category(Category),
    List,
    Open(String),
    New,
    Cancel,
    Edit(String),
    Load(PathBuf),
    Show,
    Save(Option<String>),
    Generate(String),
    Style(Option<String>),
    Render,
    Gallery { all: bool },
    Refresh,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  category <characters|environments|styles|gallery>
  list                  documents of the active category
  open <name>           open a document
  new                   start a new document from the category template
  cancel                leave new-document mode
  edit <json>           replace the buffer
  load <path>           replace the buffer with a local file
  show                  print the buffer
  save [name]           save; a new document needs a name
  generate <prompt>     generate a document into the buffer
  style [name|default]  list styles or pick one for character renders
  render                render the open document
  gallery [all]         latest results for the open document, or everything
  refresh               re-list documents and assets
  status                busy flags and last error
  quit";

/// Parses one line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> anyhow::Result<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    let rest_opt = (!rest.is_empty()).then(|| rest.to_string());

    let command = match word.to_ascii_lowercase().as_str() {
        "category" | "cat" => {
            if rest.is_empty() {
                bail!("usage: category <name>");
            }
            ConsoleCommand::Category(rest.parse().map_err(|err| anyhow!("{err}"))?)
        }
        "list" | "ls" => ConsoleCommand::List,
        "open" => ConsoleCommand::Open(rest_opt.ok_or_else(|| anyhow!("usage: open <name>"))?),
        "new" => ConsoleCommand::New,
        "cancel" => ConsoleCommand::Cancel,
        "edit" => ConsoleCommand::Edit(rest.to_string()),
        "load" => {
            ConsoleCommand::Load(PathBuf::from(rest_opt.ok_or_else(|| anyhow!("usage: load <path>"))?))
        }
        "show" => ConsoleCommand::Show,
        "save" => ConsoleCommand::Save(rest_opt),
        "generate" | "gen" => ConsoleCommand::Generate(rest.to_string()),
        "style" => ConsoleCommand::Style(rest_opt),
        "render" => ConsoleCommand::Render,
        "gallery" => match rest {
            "" => ConsoleCommand::Gallery { all: false },
            "all" => ConsoleCommand::Gallery { all: true },
            other => bail!("unexpected gallery argument '{other}'"),
        },
        "refresh" => ConsoleCommand::Refresh,
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" | "q" => ConsoleCommand::Quit,
        other => bail!("unknown command '{other}'; type 'help'"),
    };
    Ok(Some(command))
}
