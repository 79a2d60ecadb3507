//! Interactive line shell over a [`Shelf`].
//!
//! Numbers typed by the user are 1-based positions in the listing shown by
//! `list` (categories first, then links). They are turned into flat indices
//! here and handed to the core; the shell never edits the tree itself.

use std::io::{self, BufRead, Write};

use log::warn;

use crate::error::ShelfError;
use crate::model::Link;
use crate::ops::{Applied, CategoryRef};
use crate::opener::Opener;
use crate::resolve::display_path;
use crate::shelf::{Navigation, Operation, Shelf};
use crate::store::TreeStore;

pub const BANNER: &str = "🛒 Link Shelf (nested categories)";

pub const HELP: &str = "\
Commands:
  list                    show subcategories and links here
  open <n>                enter subcategory n
  back                    go up one level
  goto <n>                open link n in the browser
  goto all                open every link here
  goto range <a>-<b>      open links a to b
  add <url> [desc]        add a link
  edit <n> <url> [desc]   replace link n
  remove <n>              remove link n
  sub <name>              create a subcategory here
  new <name>              create a top-level category (root only)
  rename <n> <name>       rename subcategory n
  delcat <n>              delete subcategory n and everything in it
  exit | quit             leave";

const UNKNOWN_HINT: &str = "❓ Unknown command. Try: list, open <n>, sub <name>, add <url>, goto <n>, edit <n> <url>, remove <n>, back, exit";

/* ------------------------------- Commands ------------------------------- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GotoTarget {
    One(usize),
    All,
    Range(usize, usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Blank,
    List,
    Open(usize),
    Goto(GotoTarget),
    Add { url: String, description: String },
    Edit { number: usize, url: String, description: String },
    Remove(usize),
    Sub(String),
    New(String),
    DelCat(usize),
    Rename { number: usize, name: String },
    Back,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("{}", UNKNOWN_HINT)]
    Unknown,
    #[error("❌ Usage: {0}")]
    Usage(&'static str),
}

/// Splits off the first whitespace-separated word.
fn next_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((input, "")),
    }
}

fn number(word: &str, usage: &'static str) -> Result<usize, ParseError> {
    word.parse().map_err(|_| ParseError::Usage(usage))
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let Some((verb, rest)) = next_word(line) else {
        return Ok(Command::Blank);
    };

    match verb {
        "list" => Ok(Command::List),
        "back" => Ok(Command::Back),
        "exit" | "quit" => Ok(Command::Exit),
        "open" => {
            const USAGE: &str = "open <subcategory_number>";
            Ok(Command::Open(number(rest, USAGE)?))
        }
        "goto" => {
            const USAGE: &str = "goto <link_number>, goto all, or goto range x-y";
            match next_word(rest) {
                Some(("all", "")) => Ok(Command::Goto(GotoTarget::All)),
                Some(("range", bounds)) => {
                    let (start, end) = bounds.split_once('-').ok_or(ParseError::Usage(USAGE))?;
                    Ok(Command::Goto(GotoTarget::Range(
                        number(start.trim(), USAGE)?,
                        number(end.trim(), USAGE)?,
                    )))
                }
                Some((n, "")) => Ok(Command::Goto(GotoTarget::One(number(n, USAGE)?))),
                _ => Err(ParseError::Usage(USAGE)),
            }
        }
        "add" => {
            let (url, description) =
                next_word(rest).ok_or(ParseError::Usage("add <url> <optional description>"))?;
            Ok(Command::Add {
                url: url.to_string(),
                description: description.to_string(),
            })
        }
        "edit" => {
            const USAGE: &str = "edit <link_number> <new_url> <new_desc>";
            let (n, rest) = next_word(rest).ok_or(ParseError::Usage(USAGE))?;
            let (url, description) = next_word(rest).ok_or(ParseError::Usage(USAGE))?;
            Ok(Command::Edit {
                number: number(n, USAGE)?,
                url: url.to_string(),
                description: description.to_string(),
            })
        }
        "remove" => Ok(Command::Remove(number(rest, "remove <link_number>")?)),
        "sub" if !rest.is_empty() => Ok(Command::Sub(rest.to_string())),
        "sub" => Err(ParseError::Usage("sub <subcategory_name>")),
        "new" if !rest.is_empty() => Ok(Command::New(rest.to_string())),
        "new" => Err(ParseError::Usage("new <category_name>")),
        "delcat" => Ok(Command::DelCat(number(rest, "delcat <category_number>")?)),
        "rename" => {
            const USAGE: &str = "rename <category_number> <new_name>";
            match next_word(rest) {
                Some((n, name)) if !name.is_empty() => Ok(Command::Rename {
                    number: number(n, USAGE)?,
                    name: name.to_string(),
                }),
                _ => Err(ParseError::Usage(USAGE)),
            }
        }
        _ => Err(ParseError::Unknown),
    }
}

/* -------------------------------- Session -------------------------------- */

/// 1-based display number to flat index; 0 maps past the end so it fails
/// the same way as any other out-of-range number.
fn flat(number: usize) -> usize {
    number.checked_sub(1).unwrap_or(usize::MAX)
}

fn status(applied: &Applied) -> String {
    let icon = match applied {
        Applied::LinkAdded(_) | Applied::CategoryAdded(_) => "✅",
        Applied::LinkEdited { .. } | Applied::CategoryRenamed { .. } => "✏️",
        Applied::LinkRemoved(_) | Applied::CategoryDeleted(_) => "🗑️",
    };
    format!("{icon} {applied}")
}

/// Status line for a failed operation. `index_hint` replaces the generic
/// out-of-range message with one naming what the number should point at.
fn failure(err: &ShelfError, index_hint: &str) -> String {
    match err {
        ShelfError::InvalidIndex(_) => format!("❌ {index_hint}"),
        ShelfError::AlreadyExists(_) => format!("⚠️ {err}"),
        err if err.is_soft() => format!("⚠️ {err}"),
        err => format!("❌ {err}"),
    }
}

pub struct Session<'a, S: TreeStore, O: Opener> {
    shelf: &'a mut Shelf<S>,
    opener: O,
    path: Vec<String>,
}

impl<'a, S: TreeStore, O: Opener> Session<'a, S, O> {
    pub fn new(shelf: &'a mut Shelf<S>, opener: O) -> Self {
        Self {
            shelf,
            opener,
            path: Vec::new(),
        }
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Reads commands until `exit`/`quit` or end of input.
    pub fn run<R: BufRead, W: Write>(&mut self, input: &mut R, out: &mut W) -> io::Result<()> {
        writeln!(out, "{BANNER}")?;
        writeln!(out, "{HELP}")?;
        writeln!(out)?;

        let mut line = String::new();
        loop {
            write!(out, "{}> ", display_path(&self.path))?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                writeln!(out, "👋 Exiting.")?;
                return Ok(());
            }

            match parse_command(&line) {
                Ok(Command::Exit) => {
                    writeln!(out, "👋 Goodbye!")?;
                    return Ok(());
                }
                Ok(command) => self.dispatch(command, input, out)?,
                Err(err) => writeln!(out, "{err}")?,
            }
        }
    }

    fn dispatch<R: BufRead, W: Write>(
        &mut self,
        command: Command,
        input: &mut R,
        out: &mut W,
    ) -> io::Result<()> {
        match command {
            Command::Blank | Command::Exit => Ok(()),
            Command::List => self.list(out),
            Command::Back => {
                if self.path.pop().is_none() {
                    writeln!(out, "❌ Already at the root level.")?;
                }
                Ok(())
            }
            Command::Open(number) => match self.shelf.navigate(&self.path, flat(number)) {
                Ok(Navigation::Enter(next)) => {
                    self.path = next;
                    Ok(())
                }
                Ok(Navigation::Open(_)) | Err(_) => {
                    writeln!(out, "❌ Invalid subcategory number.")
                }
            },
            Command::Goto(target) => self.goto(target, out),
            Command::Add { url, description } => {
                self.report(Operation::AddLink { url, description }, "Invalid link number.", out)
            }
            Command::Edit {
                number,
                url,
                description,
            } => self.report(
                Operation::EditLink {
                    index: flat(number),
                    url,
                    description,
                },
                "Invalid link number.",
                out,
            ),
            Command::Remove(number) => self.report(
                Operation::RemoveLink {
                    index: flat(number),
                },
                "Invalid link number.",
                out,
            ),
            Command::Sub(name) => {
                self.report(Operation::AddCategory { name }, "Invalid category number.", out)
            }
            Command::New(name) => {
                if !self.path.is_empty() {
                    return writeln!(out, "❌ Use 'sub <name>' inside categories.");
                }
                self.report(Operation::AddCategory { name }, "Invalid category number.", out)
            }
            Command::Rename { number, name } => self.report(
                Operation::RenameCategory {
                    target: CategoryRef::Index(flat(number)),
                    new_name: name,
                },
                "Invalid category number.",
                out,
            ),
            Command::DelCat(number) => self.delete_category(number, input, out),
        }
    }

    fn report<W: Write>(&mut self, op: Operation, index_hint: &str, out: &mut W) -> io::Result<()> {
        match self.shelf.execute(&self.path, op) {
            Ok(applied) => writeln!(out, "{}", status(&applied)),
            Err(err) => writeln!(out, "{}", failure(&err, index_hint)),
        }
    }

    fn list<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let node = self.shelf.node(&self.path);
        if node.is_empty() {
            return writeln!(out, "📭 Empty category");
        }

        let mut number = 1;
        if node.category_count() > 0 {
            writeln!(out, "📂 Subcategories:")?;
            for name in node.category_names() {
                writeln!(out, "  [{number}] {name}")?;
                number += 1;
            }
        }
        if node.link_count() > 0 {
            writeln!(out, "🔗 Links:")?;
            for link in node.links() {
                writeln!(out, "  [{number}] {}", link.label())?;
                number += 1;
            }
        }
        Ok(())
    }

    fn goto<W: Write>(&mut self, target: GotoTarget, out: &mut W) -> io::Result<()> {
        let links: Vec<Link> = match target {
            GotoTarget::All => {
                let links = self.shelf.node(&self.path).links().to_vec();
                if links.is_empty() {
                    return writeln!(out, "📭 No links to open.");
                }
                writeln!(out, "🌐 Opening all {} links...", links.len())?;
                links
            }
            GotoTarget::One(number) => {
                match self.shelf.links_in_range(&self.path, flat(number), flat(number)) {
                    Ok(links) => {
                        if let Some(link) = links.first() {
                            writeln!(out, "🌐 Opening: {}", link.url())?;
                        }
                        links
                    }
                    Err(_) => return writeln!(out, "❌ Invalid link number."),
                }
            }
            GotoTarget::Range(start, end) => {
                match self.shelf.links_in_range(&self.path, flat(start), flat(end)) {
                    Ok(links) => {
                        writeln!(out, "🌐 Opening links {start} to {end}...")?;
                        links
                    }
                    Err(_) => return writeln!(out, "❌ Invalid range."),
                }
            }
        };

        for link in &links {
            if let Err(err) = self.opener.open(link.url()) {
                warn!("failed to open {}: {err}", link.url());
                writeln!(out, "❌ Failed to open: {}", link.url())?;
            }
        }
        Ok(())
    }

    fn delete_category<R: BufRead, W: Write>(
        &mut self,
        number: usize,
        input: &mut R,
        out: &mut W,
    ) -> io::Result<()> {
        let node = self.shelf.node(&self.path);
        let Ok(name) = crate::ops::category_name(node, &CategoryRef::Index(flat(number))) else {
            return writeln!(out, "❌ Invalid category number.");
        };

        write!(
            out,
            "⚠️ Are you sure you want to delete '{name}' and all its contents? (y/N): "
        )?;
        out.flush()?;
        let mut answer = String::new();
        input.read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            return writeln!(out, "❌ Cancelled.");
        }

        self.report(
            Operation::DeleteCategory {
                target: CategoryRef::Name(name),
            },
            "Invalid category number.",
            out,
        )
    }
}
