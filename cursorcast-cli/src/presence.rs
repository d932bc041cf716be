//! Terminal presence client: bridges `cursorcast-collab` with stdin/stdout.
//!
//! ## Data flow
//!
//! ```text
//!  stdin line ──► Input::parse() ──► PresenceClient (cursor / status / chat)
//!                                └─► PresenceSession (hover / leave)
//!
//!  relay ──► PresenceEvent ──► PresenceSession::apply()
//!                                     │
//!  next_deadline() ──► sleep_until ───┤
//!                                     ▼
//!                            render_scene() ──► stdout
//! ```

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;

use cursorcast_collab::{
    ClientConfig, CursorView, PresenceClient, PresenceError, PresenceEvent, PresenceSession,
    SessionId,
};

use crate::input::Input;

pub struct TerminalPresence {
    client: PresenceClient,
    events: mpsc::Receiver<PresenceEvent>,
    session: PresenceSession,
    /// Last printed scene, to avoid reprinting identical frames.
    last_scene: Vec<String>,
}

impl TerminalPresence {
    pub async fn connect(config: &ClientConfig) -> Result<Self, PresenceError> {
        let (client, events) = PresenceClient::connect(config).await?;
        let session = PresenceSession::new(Some(client.session_id().clone()));
        Ok(Self {
            client,
            events,
            session,
            last_scene: Vec::new(),
        })
    }

    pub async fn set_status(
        &self,
        location: Option<String>,
        flag: Option<String>,
    ) -> Result<(), PresenceError> {
        if location.is_none() && flag.is_none() {
            return Ok(());
        }
        self.client.set_status(location, flag).await
    }

    /// Run until `quit`, end of input, or the relay goes away.
    pub async fn run(mut self) -> Result<(), PresenceError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!(
            "connected as {} ({}); type `move X Y`, `say TEXT`, `where LOC [FLAG]`, `quit`",
            self.client.name(),
            self.client.session_id().short()
        );

        loop {
            let deadline = self.session.next_deadline(Instant::now());
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else { break };
                    let disconnected = event == PresenceEvent::Disconnected;
                    self.session.apply(event, Instant::now());
                    self.redraw();
                    if disconnected {
                        println!("relay connection lost");
                        break;
                    }
                }

                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    match Input::parse(&line) {
                        Ok(Some(Input::Quit)) => break,
                        Ok(Some(input)) => self.handle_input(input).await?,
                        Ok(None) => {}
                        Err(e) => println!("{e}"),
                    }
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                    if deadline.is_some() =>
                {
                    self.redraw();
                }
            }
        }

        self.client.disconnect().await;
        Ok(())
    }

    async fn handle_input(&mut self, input: Input) -> Result<(), PresenceError> {
        match input {
            Input::Move { x, y } => self.client.publish_cursor(x, y),
            Input::Say(text) => self.client.send_chat(text).await?,
            Input::Where { location, flag } => {
                self.client.set_status(Some(location), flag).await?;
            }
            Input::Hover(who) => match self.find_remote(&who) {
                Some(id) => {
                    self.session.pointer_enter(&id, Instant::now());
                    self.redraw();
                }
                None => println!("nobody called {who}"),
            },
            Input::Leave(who) => {
                if let Some(id) = self.find_remote(&who) {
                    self.session.pointer_leave(&id);
                    self.redraw();
                }
            }
            Input::Quit => {}
        }
        Ok(())
    }

    /// Match a remote participant by exact name or id prefix.
    fn find_remote(&self, who: &str) -> Option<SessionId> {
        self.session
            .registry()
            .remotes(self.session.local_id())
            .find(|record| record.name == who || record.id.as_str().starts_with(who))
            .map(|record| record.id.clone())
    }

    fn redraw(&mut self) {
        let scene = render_scene(&self.session.frame(Instant::now()));
        if scene == self.last_scene {
            return;
        }
        println!("── {} online ──", self.session.registry().len());
        for line in &scene {
            println!("{line}");
        }
        self.last_scene = scene;
    }
}

/// One text line per remote cursor, sorted by name then id.
pub fn render_scene(views: &[CursorView]) -> Vec<String> {
    let mut sorted: Vec<&CursorView> = views.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

    sorted
        .into_iter()
        .map(|view| {
            let mut line = format!(
                "{} {:<12} ({:>6.0}, {:>6.0}) {}",
                view.id.short(),
                view.name,
                view.position.x,
                view.position.y,
                view.color.to_hex()
            );
            if let Some(tooltip) = &view.tooltip {
                line.push_str(&format!("  [{} {}]", tooltip.location, tooltip.flag));
                if let Some(message) = &tooltip.message {
                    line.push_str(&format!(" \"{message}\""));
                }
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cursorcast_collab::{CursorColor, TooltipView, Vec2};

    fn view(id: &str, name: &str, tooltip: Option<TooltipView>) -> CursorView {
        CursorView {
            id: SessionId::from(id),
            name: name.into(),
            position: Vec2::new(100.0, 200.0),
            color: CursorColor::rgba(1.0, 0.0, 0.0, 1.0),
            tooltip,
        }
    }

    #[test]
    fn test_render_scene_sorted_by_name() {
        let scene = render_scene(&[
            view("bbbbbbbb22", "Zed", None),
            view("aaaaaaaa11", "Ann", None),
        ]);
        assert_eq!(scene.len(), 2);
        assert!(scene[0].starts_with("aaaaaaaa Ann"));
        assert!(scene[1].starts_with("bbbbbbbb Zed"));
        assert!(scene[0].contains("(   100,    200)"));
        assert!(scene[0].ends_with("#ff0000"));
    }

    #[test]
    fn test_render_scene_with_tooltip() {
        let tooltip = TooltipView {
            location: "/pricing".into(),
            flag: "FR".into(),
            message: Some("hi there".into()),
        };
        let scene = render_scene(&[view("cccccccc", "Bo", Some(tooltip))]);
        assert!(scene[0].ends_with("[/pricing FR] \"hi there\""));
    }

    #[test]
    fn test_render_empty_scene() {
        assert!(render_scene(&[]).is_empty());
    }
}
