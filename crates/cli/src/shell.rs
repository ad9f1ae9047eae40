use emotion_client_core::memory::Importance;
use std::path::PathBuf;

pub const HELP: &str = "\
commands:
  <text>                     classify a line of text
  text <text>                same, for text that starts with a command word
  file <path> [mime]         classify an audio file
  record                     record from the microphone; Enter stops
  history [days]             reload history, optionally with a new window (0 = all)
  next | prev | page <n>     move through history pages
  csv <path>                 export the filtered history as CSV
  memories                   reload saved memories
  mnext | mprev              move through memory pages
  remember <type> <importance> <content>
  insights [days]            emotion summary for the window
  profile                    show the current user's profile
  user <id>                  switch the session user
  respond                    ask for an adaptive reply
  health                     check the service
  help | quit";

#[derive(Clone, Debug, PartialEq)]
pub enum ShellCommand {
    Empty,
    Help,
    Quit,
    Health,
    Text(String),
    File { path: PathBuf, mime: Option<String> },
    Record,
    History { since_days: Option<u32> },
    NextPage,
    PrevPage,
    Page(usize),
    Csv(PathBuf),
    Memories,
    NextMemoryPage,
    PrevMemoryPage,
    Remember {
        memory_type: String,
        importance: Importance,
        content: String,
    },
    Insights { window_days: Option<u32> },
    Profile,
    User(String),
    Respond,
}

fn parse_number<T: std::str::FromStr>(what: &str, raw: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("{what} must be a whole number, got '{raw}'"))
}

fn optional_number<T: std::str::FromStr>(what: &str, rest: &str) -> Result<Option<T>, String> {
    if rest.is_empty() {
        Ok(None)
    } else {
        parse_number(what, rest).map(Some)
    }
}

/// Lines that do not start with a command word are classified as text.
pub fn parse_shell_line(line: &str) -> Result<ShellCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ShellCommand::Empty);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (line, ""),
    };

    let cmd = match word.to_ascii_lowercase().as_str() {
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        "health" => ShellCommand::Health,
        "text" => ShellCommand::Text(rest.to_owned()),
        "file" => {
            let (path, mime) = match rest.split_once(char::is_whitespace) {
                Some((p, m)) => (p, Some(m.trim().to_owned())),
                None => (rest, None),
            };
            if path.is_empty() {
                return Err("usage: file <path> [mime]".to_owned());
            }
            ShellCommand::File {
                path: PathBuf::from(path),
                mime,
            }
        }
        "record" => ShellCommand::Record,
        "history" => ShellCommand::History {
            since_days: optional_number("days", rest)?,
        },
        "next" => ShellCommand::NextPage,
        "prev" => ShellCommand::PrevPage,
        "page" => {
            if rest.is_empty() {
                return Err("usage: page <n>".to_owned());
            }
            ShellCommand::Page(parse_number("page", rest)?)
        }
        "csv" => {
            if rest.is_empty() {
                return Err("usage: csv <path>".to_owned());
            }
            ShellCommand::Csv(PathBuf::from(rest))
        }
        "memories" => ShellCommand::Memories,
        "mnext" => ShellCommand::NextMemoryPage,
        "mprev" => ShellCommand::PrevMemoryPage,
        "remember" => {
            let mut parts = rest.splitn(3, char::is_whitespace);
            match (parts.next(), parts.next(), parts.next().map(str::trim)) {
                (Some(memory_type), Some(importance), Some(content))
                    if !memory_type.is_empty() && !content.is_empty() =>
                {
                    ShellCommand::Remember {
                        memory_type: memory_type.to_owned(),
                        importance: importance.parse()?,
                        content: content.to_owned(),
                    }
                }
                _ => return Err("usage: remember <type> <importance> <content>".to_owned()),
            }
        }
        "insights" => ShellCommand::Insights {
            window_days: optional_number("days", rest)?,
        },
        "profile" => ShellCommand::Profile,
        "user" => {
            if rest.is_empty() {
                return Err("usage: user <id>".to_owned());
            }
            ShellCommand::User(rest.to_owned())
        }
        "respond" => ShellCommand::Respond,
        _ => ShellCommand::Text(line.to_owned()),
    };
    Ok(cmd)
}
