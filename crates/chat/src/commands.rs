// Line commands understood by the REPL. Anything not starting with '/' is chat text.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Send(String),
    Once(String),
    Json(String),
    Model(Option<String>),
    Clear,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse(line: &str) -> Option<Command> {
    let s = line.trim();
    if s.is_empty() {
        return None;
    }
    let Some(rest) = s.strip_prefix('/') else {
        return Some(Command::Send(s.to_string()));
    };
    let mut parts = rest.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or("").to_lowercase();
    let arg = parts.next().unwrap_or("").trim();
    let cmd = match cmd.as_str() {
        "once" if !arg.is_empty() => Command::Once(arg.to_string()),
        "json" if !arg.is_empty() => Command::Json(arg.to_string()),
        "model" if arg.is_empty() => Command::Model(None),
        "model" => Command::Model(Some(arg.to_string())),
        "clear" => Command::Clear,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(s.to_string()),
    };
    Some(cmd)
}

pub const HELP: &str = "\
Type a message and press Enter to stream a reply. Ctrl-C cancels a reply in progress.
  /once <text>    ask without streaming
  /json <prompt>  ask for a JSON object and pretty-print it
  /model [name]   show or switch the model
  /clear          forget the conversation
  /quit           leave";
