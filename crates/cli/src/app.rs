use engine::{
    AspectRatio, Command, EngineErrorKind, Event, Phase, PlaybackState, SessionSnapshot,
};
use tracing::debug;

/// Messages consumed by the front end's update loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// One line typed by the user.
    Line(String),
    InputClosed,
    Engine(Event),
    /// The playback surface finished showing clip `index` under `cue`.
    ClipFinished { index: usize, cue: u64 },
    EngineDisconnected,
}

/// Parsed user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Submit(String),
    Aspect(AspectRatio),
    Undo,
    NewProject,
    Confirm(bool),
    Play(usize),
    Stop,
    Ended,
    Download(usize),
    List,
    Status,
    Help,
    Quit,
}

impl Input {
    /// Parses one line. Text that is not a known verb is a prompt.
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let input = match verb.to_ascii_lowercase().as_str() {
            "submit" => Self::Submit(rest.to_owned()),
            "aspect" => Self::Aspect(rest.parse()?),
            "undo" if rest.is_empty() => Self::Undo,
            "new" | "reset" if rest.is_empty() => Self::NewProject,
            "y" | "yes" if rest.is_empty() => Self::Confirm(true),
            "n" | "no" if rest.is_empty() => Self::Confirm(false),
            "play" => Self::Play(parse_index(rest, Some(0))?),
            "stop" if rest.is_empty() => Self::Stop,
            "ended" | "next" if rest.is_empty() => Self::Ended,
            "download" => Self::Download(parse_index(rest, None)?),
            "list" | "ls" if rest.is_empty() => Self::List,
            "status" if rest.is_empty() => Self::Status,
            "help" | "?" if rest.is_empty() => Self::Help,
            "quit" | "exit" if rest.is_empty() => Self::Quit,
            _ => Self::Submit(line.to_owned()),
        };
        Ok(input)
    }
}

fn parse_index(text: &str, default: Option<usize>) -> Result<usize, String> {
    if text.is_empty() {
        return default.ok_or_else(|| String::from("a clip number is required"));
    }
    text.parse()
        .map_err(|_| format!("{text:?} is not a clip number"))
}

/// Destructive actions that wait for a yes/no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Undo,
    NewProject,
}

pub const HELP: &str = "\
commands:
  <prompt> | submit <prompt>  generate the first clip, or extend the last one
  aspect 16:9|9:16            aspect ratio of the first clip
  undo                        remove the last clip (asks for confirmation)
  new                         start a new project (asks for confirmation)
  play [n]                    play the sequence from clip n (default 0)
  stop                        stop sequence playback
  ended                       report that the current clip finished
  download <n>                save clip n to the export directory
  list | status | help | quit";

/// Front-end state mirrored from engine events.
#[derive(Debug, Default)]
pub struct AppState {
    snapshot: Option<SessionSnapshot>,
    pending_confirmation: Option<Confirmation>,
    request_in_flight: bool,
    /// Index and cue of the clip the surface is showing.
    playing: Option<(usize, u64)>,
    notices: Vec<String>,
    quit: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Drains the lines to show the user.
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    /// Applies one message and returns outgoing engine commands.
    pub fn update(&mut self, message: Message) -> Vec<Command> {
        match message {
            Message::Line(line) if line.trim().is_empty() => Vec::new(),
            Message::Line(line) => match Input::parse(&line) {
                Ok(input) => self.apply_input(input),
                Err(reason) => {
                    self.notice(reason);
                    Vec::new()
                }
            },
            Message::InputClosed => {
                self.quit = true;
                Vec::new()
            }
            Message::Engine(event) => {
                self.apply_engine_event(event);
                Vec::new()
            }
            Message::ClipFinished { index, cue } => vec![Command::ClipEnded { index, cue }],
            Message::EngineDisconnected => {
                self.notice("engine stopped");
                self.quit = true;
                Vec::new()
            }
        }
    }

    fn apply_input(&mut self, input: Input) -> Vec<Command> {
        if let Some(pending) = self.pending_confirmation.take() {
            match input {
                Input::Confirm(true) => return vec![confirmed_command(pending)],
                Input::Confirm(false) => {
                    self.notice("cancelled");
                    return Vec::new();
                }
                _ => self.notice("cancelled"),
            }
        }

        match input {
            Input::Submit(prompt) => self.submit(prompt),
            Input::Aspect(aspect_ratio) => {
                if self.entry_count() > 0 {
                    self.notice("aspect ratio is fixed once the sequence has started");
                    return Vec::new();
                }
                vec![Command::SetAspectRatio { aspect_ratio }]
            }
            Input::Undo => {
                if self.request_in_flight {
                    self.notice("wait for the current clip to finish generating");
                    return Vec::new();
                }
                let Some(last_prompt) = self.entries().last().map(|entry| entry.prompt.clone())
                else {
                    self.notice("nothing to undo");
                    return Vec::new();
                };
                let question = format!(
                    "remove clip #{} \"{last_prompt}\"? [y/N]",
                    self.entry_count() - 1
                );
                self.pending_confirmation = Some(Confirmation::Undo);
                self.notice(question);
                Vec::new()
            }
            Input::NewProject => {
                self.pending_confirmation = Some(Confirmation::NewProject);
                self.notice("start a new project? every clip will be discarded [y/N]");
                Vec::new()
            }
            Input::Confirm(_) => {
                self.notice("nothing to confirm");
                Vec::new()
            }
            Input::Play(from_index) => vec![Command::StartPlayback { from_index }],
            Input::Stop => vec![Command::StopPlayback],
            Input::Ended => match self.playing {
                Some((index, cue)) => vec![Command::ClipEnded { index, cue }],
                None => {
                    self.notice("nothing is playing");
                    Vec::new()
                }
            },
            Input::Download(index) => match self.entries().get(index).map(|entry| entry.id) {
                Some(entry_id) => vec![Command::Download { entry_id }],
                None => {
                    self.notice(format!("there is no clip #{index}"));
                    Vec::new()
                }
            },
            Input::List => {
                self.list();
                Vec::new()
            }
            Input::Status => {
                self.status();
                Vec::new()
            }
            Input::Help => {
                self.notice(HELP);
                Vec::new()
            }
            Input::Quit => {
                self.quit = true;
                Vec::new()
            }
        }
    }

    fn submit(&mut self, prompt: String) -> Vec<Command> {
        if self.request_in_flight {
            self.notice("a clip is still being generated");
            return Vec::new();
        }
        if prompt.trim().is_empty() {
            self.notice("prompt is empty");
            return Vec::new();
        }

        self.request_in_flight = true;
        if self.entry_count() == 0 {
            self.notice("generating the first clip...");
        } else {
            self.notice(format!("extending clip #{}...", self.entry_count() - 1));
        }
        vec![Command::Submit { prompt }]
    }

    fn apply_engine_event(&mut self, event: Event) {
        match event {
            Event::SessionChanged(snapshot) => {
                let previous = self.entry_count();
                self.request_in_flight =
                    matches!(snapshot.phase, Phase::Generating | Phase::Extending);
                if snapshot.playback == PlaybackState::Stopped {
                    self.playing = None;
                }
                let added = (snapshot.entries.len() == previous + 1)
                    .then(|| snapshot.entries.last().map(|entry| entry.prompt.clone()))
                    .flatten();
                self.snapshot = Some(snapshot);
                if let Some(prompt) = added {
                    self.notice(format!("clip #{previous} ready: {prompt}"));
                }
            }
            Event::PhaseChanged { phase } => {
                self.request_in_flight = matches!(phase, Phase::Generating | Phase::Extending);
            }
            Event::GenerationFailed { message } => {
                self.notice(format!("generation failed: {message}"));
                self.notice("edit the prompt or submit it again to retry");
            }
            Event::PlayClip {
                index, cue, bytes, ..
            } => {
                self.playing = Some((index, cue));
                self.notice(format!("playing clip #{index} ({} bytes)", bytes.len()));
            }
            Event::PlaybackStopped => {
                self.playing = None;
                self.notice("playback stopped");
            }
            Event::MediaReleased { media } => {
                debug!(count = media.len(), "media released");
            }
            Event::ClipDownloaded { path, .. } => {
                self.notice(format!("saved {}", path.display()));
            }
            Event::Error(error) => match error.kind {
                EngineErrorKind::Generation => {}
                EngineErrorKind::Playback => {
                    debug!(message = %error.message, "playback report ignored");
                }
                _ => {
                    self.request_in_flight = false;
                    self.notice(format!("error: {}", error.message));
                }
            },
        }
    }

    fn list(&mut self) {
        if self.entry_count() == 0 {
            self.notice("no clips yet; type a prompt to start");
            return;
        }
        let lines: Vec<String> = self
            .entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let marker = if self.playing.map(|(playing, _)| playing) == Some(index) {
                    '>'
                } else {
                    ' '
                };
                let kind = if entry.is_extension { "extend" } else { "base" };
                format!(
                    "{marker} #{index} [{kind}] {} ({})",
                    entry.prompt,
                    entry.created_at.format("%H:%M:%S")
                )
            })
            .collect();
        self.notices.extend(lines);
    }

    fn status(&mut self) {
        let Some(snapshot) = &self.snapshot else {
            self.notice("no project started");
            return;
        };
        let mut line = format!(
            "phase: {}, aspect ratio: {}{}, clips: {}",
            snapshot.phase,
            snapshot.aspect_ratio,
            if snapshot.aspect_ratio_editable { "" } else { " (fixed)" },
            snapshot.entries.len()
        );
        if let PlaybackState::Playing { index } = snapshot.playback {
            line.push_str(&format!(", playing #{index}"));
        }
        if let Some(error) = &snapshot.last_error {
            line.push_str(&format!(", last error: {error}"));
        }
        self.notice(line);
    }

    fn entries(&self) -> &[engine::EntrySummary] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.entries.as_slice())
            .unwrap_or_default()
    }

    fn entry_count(&self) -> usize {
        self.entries().len()
    }

    fn notice(&mut self, line: impl Into<String>) {
        self.notices.push(line.into());
    }
}

fn confirmed_command(confirmation: Confirmation) -> Command {
    match confirmation {
        Confirmation::Undo => Command::Undo,
        Confirmation::NewProject => Command::ResetProject,
    }
}
