//! User command surface — parsed before batching (commands bypass it) and
//! executed against the managers. Transport-neutral verbs with a `/`
//! prefix.

/// A parsed user command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/character` lists; `/character new` starts the Q/A flow;
    /// `/character <name>` activates.
    Character(Option<String>),
    /// `/brain <provider> <model>` — then the next message is the key.
    Brain(Option<(String, String)>),
    /// `/orchestrator <provider> <model>` — symmetric to `/brain`.
    Orchestrator(Option<(String, String)>),
    /// `/claudemodel <model>` — switch the Claude model in place.
    ClaudeModel(Option<String>),
    /// `/claude [api_key|oauth_token]` — then the next message is the credential.
    Claude(Option<String>),
    /// `/skills`, `/skills reset`, `/skills new`, `/skills <id>`.
    Skills(SkillsCmd),
    Jobs,
    /// `/cancel [job_id]` — no id cancels every running job in the chat.
    Cancel(Option<String>),
    Auto(AutoCmd),
    Life(LifeCmd),
    /// `/journal [YYYY-MM-DD|list]`.
    Journal(Option<String>),
    /// `/memories [about <query>]`.
    Memories(Option<String>),
    Evolution(EvolutionCmd),
    Linkedin(LinkedinCmd),
    Context,
    /// `/clean`, `/clear`, `/reset` — wipe the chat history.
    Clean,
    History,
    Browse(String),
    Screenshot(String),
    Extract { url: String, selector: String },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkillsCmd {
    List,
    Reset,
    New,
    Select(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoCmd {
    List,
    Pause(String),
    Resume(String),
    Delete(String),
    Run(String),
    /// Free text routed to the orchestrator, which owns `create_automation`.
    Natural(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifeCmd {
    Review,
    Pause,
    Resume,
    Trigger(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvolutionCmd {
    Summary,
    History,
    Lessons,
    Trigger,
    Scan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkedinCmd {
    Status,
    Link(String),
    Unlink,
}

pub fn is_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

/// Parse a command message. `None` for unknown verbs — those fall through
/// to the normal pipeline.
pub fn parse(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('/')?;
    let mut parts = body.split_whitespace();
    let verb = parts.next()?.to_lowercase();
    let rest: Vec<&str> = parts.collect();
    let rest_joined = rest.join(" ");

    let cmd = match verb.as_str() {
        "character" => Command::Character(non_empty(&rest_joined)),
        "brain" => Command::Brain(provider_model(&rest)),
        "orchestrator" => Command::Orchestrator(provider_model(&rest)),
        "claudemodel" => Command::ClaudeModel(non_empty(&rest_joined)),
        "claude" => Command::Claude(non_empty(&rest_joined)),
        "skills" => match rest.first().copied() {
            None => Command::Skills(SkillsCmd::List),
            Some("reset") => Command::Skills(SkillsCmd::Reset),
            Some("new") => Command::Skills(SkillsCmd::New),
            Some(id) => Command::Skills(SkillsCmd::Select(id.to_string())),
        },
        "jobs" => Command::Jobs,
        "cancel" => Command::Cancel(non_empty(&rest_joined)),
        "auto" => match rest.as_slice() {
            [] => Command::Auto(AutoCmd::List),
            ["pause", id] => Command::Auto(AutoCmd::Pause(id.to_string())),
            ["resume", id] => Command::Auto(AutoCmd::Resume(id.to_string())),
            ["delete", id] => Command::Auto(AutoCmd::Delete(id.to_string())),
            ["run", id] => Command::Auto(AutoCmd::Run(id.to_string())),
            _ => Command::Auto(AutoCmd::Natural(rest_joined.clone())),
        },
        "life" => match rest.as_slice() {
            [] | ["review"] => Command::Life(LifeCmd::Review),
            ["pause"] => Command::Life(LifeCmd::Pause),
            ["resume"] => Command::Life(LifeCmd::Resume),
            ["trigger"] => Command::Life(LifeCmd::Trigger(None)),
            ["trigger", kind] => Command::Life(LifeCmd::Trigger(Some(kind.to_string()))),
            _ => return None,
        },
        "journal" => Command::Journal(non_empty(&rest_joined)),
        "memories" => match rest.as_slice() {
            [] => Command::Memories(None),
            ["about", ..] => Command::Memories(non_empty(&rest[1..].join(" "))),
            _ => Command::Memories(non_empty(&rest_joined)),
        },
        "evolution" => match rest.first().copied() {
            None => Command::Evolution(EvolutionCmd::Summary),
            Some("history") => Command::Evolution(EvolutionCmd::History),
            Some("lessons") => Command::Evolution(EvolutionCmd::Lessons),
            Some("trigger") => Command::Evolution(EvolutionCmd::Trigger),
            Some("scan") => Command::Evolution(EvolutionCmd::Scan),
            _ => return None,
        },
        "linkedin" => match rest.as_slice() {
            [] => Command::Linkedin(LinkedinCmd::Status),
            ["link", token] => Command::Linkedin(LinkedinCmd::Link(token.to_string())),
            ["unlink"] => Command::Linkedin(LinkedinCmd::Unlink),
            _ => return None,
        },
        "context" => Command::Context,
        "clean" | "clear" | "reset" => Command::Clean,
        "history" => Command::History,
        "browse" => Command::Browse(non_empty(&rest_joined)?),
        "screenshot" => Command::Screenshot(non_empty(&rest_joined)?),
        "extract" => match rest.as_slice() {
            [url, selector @ ..] if !selector.is_empty() => Command::Extract {
                url: url.to_string(),
                selector: selector.join(" "),
            },
            _ => return None,
        },
        "help" => Command::Help,
        _ => return None,
    };
    Some(cmd)
}

pub fn help_text() -> String {
    "**Commands**\n\
     - `/character [new|<name>]` — identities\n\
     - `/brain <provider> <model>` — set the worker model (key follows)\n\
     - `/orchestrator <provider> <model>` — set the orchestrator model\n\
     - `/claudemodel <model>` | `/claude [api_key|oauth_token]`\n\
     - `/skills [reset|new|<id>]` — per-chat skill\n\
     - `/jobs` | `/cancel [id]`\n\
     - `/auto [pause|resume|delete|run <id>|<describe one>]`\n\
     - `/life [pause|resume|trigger [kind]|review]`\n\
     - `/journal [YYYY-MM-DD|list]` | `/memories [about <q>]`\n\
     - `/evolution [history|lessons|trigger|scan]`\n\
     - `/linkedin [link <token>|unlink]`\n\
     - `/context` | `/history` | `/clean`\n\
     - `/browse <url>` | `/screenshot <url>` | `/extract <url> <sel>`\n\
     - `/help`"
        .to_string()
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

fn provider_model(rest: &[&str]) -> Option<(String, String)> {
    match rest {
        [provider, model] => Some((provider.to_string(), model.to_string())),
        _ => None,
    }
}
