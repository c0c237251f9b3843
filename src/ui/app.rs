use crate::api::MessageApi;
use crate::config::Config;
use crate::events::{AppEvent, LiveEvent, TuiEvent};
use crate::live::LiveConnection;
use crate::model::Conversation;
use crate::ui::chat::{ChatCommand, ChatPane};
use crate::ui::sidebar::{ConversationList, ListAction};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style},
    text::{Line, Span},
};
use std::sync::Arc;
use strum::Display;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Which panel receives keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Focus {
    Sidebar,
    Chat,
}

/// Root composition: owns both panels, the live connection, and the
/// narrow/wide layout switch. Background work reports back through
/// `events_tx` and is applied in `handle_event`.
pub struct App {
    api: Arc<dyn MessageApi>,
    live: LiveConnection,
    events_tx: mpsc::UnboundedSender<AppEvent>,
    list: ConversationList,
    chat: ChatPane,
    breakpoint: u16,
    narrow: bool,
    show_chat: bool,
    focus: Focus,
    should_quit: bool,
}

impl App {
    pub fn new(
        config: &Config,
        api: Arc<dyn MessageApi>,
        live: LiveConnection,
        events_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            api,
            live,
            events_tx,
            list: ConversationList::new(config.ui.profile_name.clone()),
            chat: ChatPane::new(),
            breakpoint: config.ui.narrow_breakpoint,
            narrow: false,
            show_chat: false,
            focus: Focus::Sidebar,
            should_quit: false,
        }
    }

    /// Connect the live channel and fetch the conversation list
    pub fn start(&mut self, width: u16) {
        info!("Starting wachat UI");
        self.live.connect();
        self.on_resize(width);
        self.load_conversations();
    }

    pub async fn shutdown(&mut self) {
        info!("Shutting down wachat UI");
        self.live.disconnect().await;
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    #[cfg(test)]
    fn is_narrow(&self) -> bool {
        self.narrow
    }

    #[cfg(test)]
    fn is_showing_chat(&self) -> bool {
        self.show_chat
    }

    #[cfg(test)]
    fn selected(&self) -> Option<&Conversation> {
        self.chat.selected()
    }

    pub fn on_resize(&mut self, width: u16) {
        let narrow = width < self.breakpoint;
        if narrow != self.narrow {
            debug!("Layout is now {}", if narrow { "narrow" } else { "wide" });
        }
        self.narrow = narrow;
    }

    /// Panel that currently takes input
    pub fn focus(&self) -> Focus {
        if self.narrow {
            if self.show_chat { Focus::Chat } else { Focus::Sidebar }
        } else if self.chat.selected().is_none() {
            Focus::Sidebar
        } else {
            self.focus
        }
    }

    pub fn select_conversation(&mut self, conversation: Conversation) {
        debug!("Selecting conversation {}", conversation.wa_id);
        let commands = self.chat.select(Some(conversation));
        self.run_commands(commands);
        if self.narrow {
            self.show_chat = true;
        }
        self.focus = Focus::Chat;
    }

    /// Back to the list; only meaningful on narrow layouts
    pub fn back(&mut self) {
        if !self.narrow {
            return;
        }
        self.show_chat = false;
        self.focus = Focus::Sidebar;
        let commands = self.chat.select(None);
        self.run_commands(commands);
    }

    pub fn handle_tui_event(&mut self, event: TuiEvent) {
        match event {
            TuiEvent::Key(key) => self.handle_key(key),
            TuiEvent::Paste(text) => match self.focus() {
                Focus::Sidebar => self.list.paste(&text),
                Focus::Chat => self.chat.paste(&text),
            },
            TuiEvent::Resize(width) => self.on_resize(width),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Esc => {
                self.back();
                return;
            }
            KeyCode::Tab if !self.narrow && self.chat.selected().is_some() => {
                self.focus = match self.focus {
                    Focus::Sidebar => Focus::Chat,
                    Focus::Chat => Focus::Sidebar,
                };
                debug!("Focus moved to {}", self.focus);
                return;
            }
            _ => {}
        }

        match self.focus() {
            Focus::Sidebar => match self.list.handle_key(key) {
                ListAction::Select(conversation) => self.select_conversation(conversation),
                ListAction::Retry => self.load_conversations(),
                ListAction::None => {}
            },
            Focus::Chat => {
                let commands = self.chat.handle_key(key);
                self.run_commands(commands);
            }
        }
    }

    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ConversationsLoaded(result) => self.list.apply_loaded(result),
            AppEvent::MessagesLoaded { wa_id, result } => self.chat.apply_loaded(&wa_id, result),
            AppEvent::MessageSent { wa_id, result } => {
                let commands = self.chat.apply_sent(&wa_id, result);
                self.run_commands(commands);
            }
            AppEvent::Live(event) => {
                let refresh = matches!(event, LiveEvent::MessagesRead(_));
                self.chat.apply_live(event);
                if refresh {
                    self.refresh_conversations();
                }
            }
        }
    }

    /// Fetch with the loading state shown (startup and retry)
    fn load_conversations(&mut self) {
        self.list.begin_load();
        self.refresh_conversations();
    }

    /// Fetch in the background, keeping the current list on screen
    fn refresh_conversations(&self) {
        let api = Arc::clone(&self.api);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = api.get_conversations().await;
            let _ = tx.send(AppEvent::ConversationsLoaded(result));
        });
    }

    fn run_commands(&mut self, commands: Vec<ChatCommand>) {
        for command in commands {
            self.run_command(command);
        }
    }

    fn run_command(&mut self, command: ChatCommand) {
        match command {
            ChatCommand::Leave(wa_id) => self.live.leave_conversation(&wa_id),
            ChatCommand::Join(wa_id) => self.live.join_conversation(&wa_id),
            ChatCommand::LoadMessages(wa_id) => {
                let api = Arc::clone(&self.api);
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = api.get_conversation(&wa_id).await;
                    let _ = tx.send(AppEvent::MessagesLoaded { wa_id, result });
                });
            }
            ChatCommand::MarkRead(wa_id) => {
                let api = Arc::clone(&self.api);
                tokio::spawn(async move {
                    if let Err(e) = api.mark_as_read(&wa_id).await {
                        error!("Error marking as read: {}", e);
                    }
                });
            }
            ChatCommand::Send {
                wa_id,
                body,
                contact_name,
            } => {
                let api = Arc::clone(&self.api);
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = api.send_message(&wa_id, &body, &contact_name).await;
                    let _ = tx.send(AppEvent::MessageSent { wa_id, result });
                });
            }
            ChatCommand::Subscribe => self.subscribe(),
            ChatCommand::Unsubscribe => self.live.remove_listeners(),
            ChatCommand::RefreshConversations => self.refresh_conversations(),
        }
    }

    fn subscribe(&self) {
        let tx = self.events_tx.clone();
        self.live.on_new_message(move |message| {
            let _ = tx.send(AppEvent::Live(LiveEvent::NewMessage(message)));
        });
        let tx = self.events_tx.clone();
        self.live.on_message_update(move |message| {
            let _ = tx.send(AppEvent::Live(LiveEvent::MessageUpdate(message)));
        });
        let tx = self.events_tx.clone();
        self.live.on_messages_read(move |read| {
            let _ = tx.send(AppEvent::Live(LiveEvent::MessagesRead(read)));
        });
    }

    pub fn draw(&self, frame: &mut Frame) {
        let area = frame.size();
        let focus = self.focus();
        let selected = self.chat.selected().map(|c| c.wa_id.as_str());
        let buf = frame.buffer_mut();

        if self.narrow {
            if self.show_chat {
                let chunks = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Length(1), Constraint::Min(0)])
                    .split(area);
                let back = Line::from(Span::styled(
                    "← Back (Esc)",
                    Style::default().fg(Color::Green),
                ));
                buf.set_line(chunks[0].x, chunks[0].y, &back, chunks[0].width);
                self.chat.render(chunks[1], buf, true);
            } else {
                self.list.render(area, buf, selected, true);
            }
            return;
        }

        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(33), Constraint::Percentage(67)])
            .split(area);
        self.list.render(chunks[0], buf, selected, focus == Focus::Sidebar);
        self.chat.render(chunks[1], buf, focus == Focus::Chat);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::live::{Connector, FrameLink, LiveError};
    use crate::model::{Message, MessageStatus, MessagesRead};
    use async_trait::async_trait;
    use ratatui::{Terminal, backend::TestBackend};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<String>>,
        fail_send: bool,
    }

    impl FakeApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn conversation(wa_id: &str, name: &str) -> Conversation {
        Conversation {
            wa_id: wa_id.to_string(),
            contact_name: name.to_string(),
            last_message: "hello".to_string(),
            last_timestamp: 1_700_000_000,
            unread_count: 2,
        }
    }

    fn message(id: &str, wa_id: &str, body: &str) -> Message {
        Message {
            message_id: id.to_string(),
            record_id: None,
            wa_id: wa_id.to_string(),
            message_body: body.to_string(),
            timestamp: 1_700_000_000,
            is_from_business: true,
            status: MessageStatus::Sent,
        }
    }

    #[async_trait]
    impl MessageApi for FakeApi {
        async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
            self.calls.lock().unwrap().push("list".to_string());
            Ok(vec![conversation("111", "Alice"), conversation("222", "Bob")])
        }

        async fn get_conversation(&self, wa_id: &str) -> Result<Vec<Message>, ApiError> {
            self.calls.lock().unwrap().push(format!("load {}", wa_id));
            Ok(vec![message(&format!("m-{}", wa_id), wa_id, &format!("history of {}", wa_id))])
        }

        async fn send_message(
            &self,
            wa_id: &str,
            message_body: &str,
            _contact_name: &str,
        ) -> Result<Option<Message>, ApiError> {
            self.calls.lock().unwrap().push(format!("send {} {}", wa_id, message_body));
            if self.fail_send {
                return Err(ApiError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(Some(message("sent-1", wa_id, message_body)))
        }

        async fn mark_as_read(&self, wa_id: &str) -> Result<(), ApiError> {
            self.calls.lock().unwrap().push(format!("read {}", wa_id));
            Ok(())
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &str) -> Result<FrameLink, LiveError> {
            Err(LiveError::Connect("offline".to_string()))
        }
    }

    fn app_with(api: Arc<FakeApi>) -> (App, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let live = LiveConnection::new(
            "http://localhost:5000",
            Duration::from_millis(50),
            Arc::new(RefusingConnector),
        );
        (App::new(&Config::default(), api, live, tx), rx)
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> AppEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        let buf = terminal.backend().buffer();
        (0..buf.area.height)
            .map(|y| {
                (0..buf.area.width)
                    .map(|x| buf.get(x, y).symbol().to_string())
                    .collect::<String>()
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn test_narrow_select_and_back() {
        let api = Arc::new(FakeApi::default());
        let (mut app, mut rx) = app_with(api.clone());
        app.start(80);
        assert!(app.is_narrow());

        let event = next_event(&mut rx).await;
        app.handle_event(event);

        app.handle_key(press(KeyCode::Enter));
        assert!(app.is_showing_chat());
        assert_eq!(app.selected().map(|c| c.wa_id.as_str()), Some("111"));
        assert_eq!(app.focus(), Focus::Chat);

        let event = next_event(&mut rx).await;
        app.handle_event(event);

        app.handle_key(press(KeyCode::Esc));
        assert!(!app.is_showing_chat());
        assert!(app.selected().is_none());
        assert_eq!(app.focus(), Focus::Sidebar);

        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = api.calls();
        assert!(calls.contains(&"load 111".to_string()));
        assert!(calls.contains(&"read 111".to_string()));
    }

    #[tokio::test]
    async fn test_wide_layout_keeps_both_panels() {
        let api = Arc::new(FakeApi::default());
        let (mut app, mut rx) = app_with(api);
        app.start(140);
        assert!(!app.is_narrow());
        let event = next_event(&mut rx).await;
        app.handle_event(event);

        app.handle_key(press(KeyCode::Down));
        app.handle_key(press(KeyCode::Enter));
        assert_eq!(app.selected().map(|c| c.wa_id.as_str()), Some("222"));
        assert!(!app.is_showing_chat());

        // Back is inert on wide layouts
        app.handle_key(press(KeyCode::Esc));
        assert!(app.selected().is_some());

        let event = next_event(&mut rx).await;
        app.handle_event(event);

        let mut terminal = Terminal::new(TestBackend::new(140, 20)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();
        let text = screen(&terminal);
        assert!(text.contains("Alice"));
        assert!(text.contains("history of 222"));
    }

    #[tokio::test]
    async fn test_resize_switches_layout() {
        let (mut app, _rx) = app_with(Arc::new(FakeApi::default()));
        app.on_resize(140);
        assert!(!app.is_narrow());
        app.handle_tui_event(TuiEvent::Resize(60));
        assert!(app.is_narrow());
        app.handle_tui_event(TuiEvent::Resize(96));
        assert!(!app.is_narrow());
    }

    #[tokio::test]
    async fn test_stale_history_is_ignored() {
        let api = Arc::new(FakeApi::default());
        let (mut app, mut rx) = app_with(api);
        app.on_resize(140);
        app.select_conversation(conversation("111", "Alice"));
        app.select_conversation(conversation("222", "Bob"));

        for _ in 0..2 {
            let event = next_event(&mut rx).await;
            app.handle_event(event);
        }

        let mut terminal = Terminal::new(TestBackend::new(140, 20)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();
        let text = screen(&terminal);
        assert!(text.contains("history of 222"));
        assert!(!text.contains("history of 111"));
    }

    #[tokio::test]
    async fn test_send_success_refreshes_list() {
        let api = Arc::new(FakeApi::default());
        let (mut app, mut rx) = app_with(api.clone());
        app.on_resize(140);
        app.select_conversation(conversation("111", "Alice"));
        let event = next_event(&mut rx).await;
        app.handle_event(event);

        app.handle_tui_event(TuiEvent::Paste("hi there".to_string()));
        app.handle_key(press(KeyCode::Enter));

        let event = next_event(&mut rx).await;
        assert!(matches!(event, AppEvent::MessageSent { .. }));
        app.handle_event(event);

        let event = next_event(&mut rx).await;
        assert!(matches!(event, AppEvent::ConversationsLoaded(Ok(_))));
        assert!(api.calls().contains(&"send 111 hi there".to_string()));
    }

    #[tokio::test]
    async fn test_send_failure_keeps_draft() {
        let api = Arc::new(FakeApi {
            fail_send: true,
            ..FakeApi::default()
        });
        let (mut app, mut rx) = app_with(api);
        app.on_resize(140);
        app.select_conversation(conversation("111", "Alice"));
        let event = next_event(&mut rx).await;
        app.handle_event(event);

        app.handle_tui_event(TuiEvent::Paste("keep me".to_string()));
        app.handle_key(press(KeyCode::Enter));
        let event = next_event(&mut rx).await;
        app.handle_event(event);

        let mut terminal = Terminal::new(TestBackend::new(140, 20)).unwrap();
        terminal.draw(|f| app.draw(f)).unwrap();
        assert!(screen(&terminal).contains("keep me"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_messages_read_event_refreshes_list() {
        let (mut app, mut rx) = app_with(Arc::new(FakeApi::default()));
        app.handle_event(AppEvent::Live(LiveEvent::MessagesRead(MessagesRead {
            wa_id: "111".to_string(),
            message_ids: Vec::new(),
        })));
        let event = next_event(&mut rx).await;
        assert!(matches!(event, AppEvent::ConversationsLoaded(Ok(_))));
    }

    #[tokio::test]
    async fn test_ctrl_c_quits() {
        let (mut app, _rx) = app_with(Arc::new(FakeApi::default()));
        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit());
    }
}
