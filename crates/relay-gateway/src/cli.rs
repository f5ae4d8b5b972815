//! CLI (Command Line Interface) mode
//!
//! Provides an interactive REPL client for a running relay server.
//! Also supports non-interactive execute mode for one-shot prompts.

use std::io::Write;
use std::path::Path;

use nu_ansi_term::{Color, Style};
use reedline::{
    ColumnarMenu, Completer, DefaultHinter, Emacs, KeyCode, KeyModifiers, Keybindings,
    MenuBuilder, Prompt, Reedline, ReedlineEvent, ReedlineMenu, Signal, Suggestion,
};
use tracing::info;

use crate::client::{ChatClient, ClientConfig};
use crate::render::Renderer;

/// Available commands for autocomplete display
const COMMANDS: &[(&str, &str)] = &[
    ("/help", "ヘルプを表示"),
    ("/new", "新しいセッションを開始"),
    ("/session", "現在のセッション ID を表示"),
    ("/exit", "プログラムを終了"),
    ("/quit", "プログラムを終了"),
];

/// Command completer for reedline
#[derive(Clone)]
pub struct CommandCompleter {
    commands: Vec<(&'static str, &'static str)>,
}

impl CommandCompleter {
    pub fn new() -> Self {
        Self {
            commands: COMMANDS.to_vec(),
        }
    }
}

impl Default for CommandCompleter {
    fn default() -> Self {
        Self::new()
    }
}

impl Completer for CommandCompleter {
    fn complete(&mut self, line: &str, pos: usize) -> Vec<Suggestion> {
        if !line.starts_with('/') {
            return Vec::new();
        }

        self.commands
            .iter()
            .filter(|(cmd, _)| cmd.starts_with(line))
            .map(|(cmd, desc)| Suggestion {
                value: cmd.to_string(),
                description: Some(desc.to_string()),
                extra: None,
                span: reedline::Span::new(0, pos),
                append_whitespace: true,
                style: None,
            })
            .collect()
    }
}

/// Prompt showing the first characters of the current session id
struct SessionPrompt {
    style: Style,
    session_label: Option<String>,
}

impl SessionPrompt {
    fn new(session_id: Option<&str>) -> Self {
        Self {
            style: Color::Green.bold(),
            session_label: session_id.map(|id| id.chars().take(8).collect()),
        }
    }
}

impl Prompt for SessionPrompt {
    fn render_prompt_left(&self) -> std::borrow::Cow<'_, str> {
        let prompt = self.style.paint("> ").to_string();
        match &self.session_label {
            Some(label) => std::borrow::Cow::Owned(format!(
                "{} {}",
                Color::DarkGray.paint(format!("[{}]", label)),
                prompt
            )),
            None => std::borrow::Cow::Owned(prompt),
        }
    }

    fn render_prompt_right(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, _prompt_mode: reedline::PromptEditMode) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_multiline_indicator(&self) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }

    fn render_prompt_history_search_indicator(
        &self,
        _history_search: reedline::PromptHistorySearch,
    ) -> std::borrow::Cow<'_, str> {
        std::borrow::Cow::Borrowed("")
    }
}

/// Result of interpreting one line of REPL input
#[derive(Debug, PartialEq, Eq)]
enum Command {
    /// Send the line to the agent
    Chat,
    /// Handled locally; read the next line
    Handled,
    Exit,
}

/// Run CLI interactive mode
pub async fn run_interactive(config: ClientConfig) -> anyhow::Result<()> {
    info!(api_url = %config.api_url, "Starting interactive mode");
    let mut client = ChatClient::new(config);

    print_welcome();

    // Setup keybindings
    let mut keybindings = default_keybindings();

    // Trigger completion on '/' key
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Char('/'),
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );

    let menu = Box::new(
        ColumnarMenu::default()
            .with_name("command_menu")
            .with_columns(1)
            .with_column_width(Some(40))
            .with_only_buffer_difference(false),
    );

    let hinter = DefaultHinter::default().with_style(Style::new().dimmed());

    let mut line_editor = Reedline::create()
        .with_completer(Box::new(CommandCompleter::new()))
        .with_menu(ReedlineMenu::EngineCompleter(menu))
        .with_hinter(Box::new(hinter))
        .with_edit_mode(Box::new(Emacs::new(keybindings)));

    loop {
        let prompt = SessionPrompt::new(client.session_id());
        let signal = line_editor.read_line(&prompt);

        match signal {
            Ok(Signal::Success(line)) => {
                let input = line.trim();

                if input.is_empty() {
                    continue;
                }

                match handle_command(input, &mut client) {
                    Command::Exit => break,
                    Command::Handled => continue,
                    Command::Chat => {}
                }

                if let Err(e) = stream_turn(&mut client, input).await {
                    eprintln!("\n❌ エラー: {}\n", e);
                }
            }
            Ok(Signal::CtrlC) => {
                println!("^C");
                continue;
            }
            Ok(Signal::CtrlD) => {
                println!("\n👋 さようなら！\n");
                break;
            }
            Err(err) => {
                eprintln!("\n❌ エラー: {}\n", err);
                break;
            }
        }
    }

    Ok(())
}

/// Default keybindings for reedline
fn default_keybindings() -> Keybindings {
    let mut keybindings = Keybindings::new();
    // Tab key triggers completion
    keybindings.add_binding(
        KeyModifiers::NONE,
        KeyCode::Tab,
        ReedlineEvent::Edit(vec![reedline::EditCommand::Complete]),
    );
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Enter, ReedlineEvent::Submit);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Esc, ReedlineEvent::Esc);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('c'), ReedlineEvent::CtrlC);
    keybindings.add_binding(KeyModifiers::CONTROL, KeyCode::Char('d'), ReedlineEvent::CtrlD);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Up, ReedlineEvent::Up);
    keybindings.add_binding(KeyModifiers::NONE, KeyCode::Down, ReedlineEvent::Down);
    keybindings
}

/// Handle REPL commands (new, exit, /help, /session)
fn handle_command(input: &str, client: &mut ChatClient) -> Command {
    let lower = input.to_lowercase();

    match lower.as_str() {
        "exit" | "quit" | "/exit" | "/quit" | "/q" => {
            println!("\n👋 さようなら！\n");
            Command::Exit
        }
        "new" | "/new" => {
            client.reset_session();
            println!("\n🔄 新しいセッションを開始します\n");
            Command::Handled
        }
        "/session" => {
            match client.session_id() {
                Some(id) => println!("\n🆔 {}\n", id),
                None => println!("\n🆔 (未開始)\n"),
            }
            Command::Handled
        }
        "/help" | "/?" => {
            print_help();
            Command::Handled
        }
        _ if lower.starts_with('/') => {
            eprintln!("\n❓ 不明なコマンド: {}。/help でコマンド一覧を確認してください。\n", input);
            Command::Handled
        }
        _ => Command::Chat,
    }
}

/// Send one prompt and print events as they stream in
async fn stream_turn(client: &mut ChatClient, prompt: &str) -> anyhow::Result<()> {
    let mut renderer = Renderer::new(client.session_id().is_some());
    client
        .chat(prompt, |event| {
            if let Some(out) = renderer.render(event) {
                if out.starts_with('\r') {
                    // Progress lines overwrite themselves
                    print!("{}", out);
                    let _ = std::io::stdout().flush();
                } else {
                    println!("{}", out);
                }
            }
        })
        .await
}

/// Print welcome message
fn print_welcome() {
    let border = Color::Cyan;
    println!();
    println!("{}", border.paint("╭─────────────────────────────────────────╮"));
    println!("{}   🤖 agent-relay CLI - 対話モード       {}", border.paint("│"), border.paint("│"));
    println!("{}   'exit' または Ctrl+D で終了            {}", border.paint("│"), border.paint("│"));
    println!("{}   'new' で新しいセッションを開始         {}", border.paint("│"), border.paint("│"));
    println!("{}", border.paint("╰─────────────────────────────────────────╯"));
    println!();
}

/// Print help message
fn print_help() {
    println!();
    println!("📖 利用可能なコマンド:");
    println!("  new - 新しいセッションを開始");
    println!("  exit, quit - プログラムを終了");
    for (cmd, desc) in COMMANDS {
        println!("  {} - {}", cmd, desc);
    }
    println!();
    println!("💡 ヒント: / から入力するとコマンド候補が表示されます");
    println!();
}

// ============================================================================
// 非対話モード (Non-interactive mode)
// ============================================================================

/// 非対話モード: プロンプトを送信し、ストリームを表示して終了
///
/// # 使用例
/// ```bash
/// agent-relay --execute "今日の天気は？"
/// agent-relay "2 + 2 を計算して"
/// ```
pub async fn run_execute(config: ClientConfig, prompt: &str) -> anyhow::Result<()> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("プロンプトが空です");
    }

    info!(api_url = %config.api_url, "Starting execute mode");
    let mut client = ChatClient::new(config);
    stream_turn(&mut client, prompt).await
}

/// 非対話モード: ファイルからプロンプトを読み込んで実行
///
/// # 使用例
/// ```bash
/// agent-relay --file prompt.txt
/// ```
pub async fn run_file(config: ClientConfig, path: &Path) -> anyhow::Result<()> {
    let prompt = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("ファイルの読み込みに失敗しました: {}: {}", path.display(), e))?;

    if prompt.trim().is_empty() {
        anyhow::bail!("ファイルの内容が空です: {}", path.display());
    }

    info!("Executing prompt from file: {}", path.display());
    run_execute(config, &prompt).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ChatClient {
        ChatClient::new(ClientConfig {
            api_url: "http://localhost:0".to_string(),
            api_key: None,
        })
    }

    #[test]
    fn test_completer_filters_slash_commands() {
        let mut completer = CommandCompleter::new();
        let values: Vec<String> = completer.complete("/s", 2).into_iter().map(|s| s.value).collect();
        assert_eq!(values, vec!["/session"]);
        assert!(completer.complete("hello", 5).is_empty());
        assert_eq!(completer.complete("/", 1).len(), COMMANDS.len());
    }

    #[test]
    fn test_handle_command() {
        let mut client = client();
        assert_eq!(handle_command("exit", &mut client), Command::Exit);
        assert_eq!(handle_command("QUIT", &mut client), Command::Exit);
        assert_eq!(handle_command("/exit", &mut client), Command::Exit);
        assert_eq!(handle_command("new", &mut client), Command::Handled);
        assert_eq!(handle_command("/session", &mut client), Command::Handled);
        assert_eq!(handle_command("/bogus", &mut client), Command::Handled);
        assert_eq!(handle_command("what is new?", &mut client), Command::Chat);
    }

    #[test]
    fn test_prompt_shows_short_session_id() {
        let prompt = SessionPrompt::new(Some("0123456789abcdef"));
        let left = prompt.render_prompt_left();
        assert!(left.contains("[01234567]"));
        assert!(!left.contains("89abcdef"));

        let prompt = SessionPrompt::new(None);
        assert!(!prompt.render_prompt_left().contains('['));
    }

    #[tokio::test]
    async fn test_execute_rejects_blank_prompt() {
        let config = ClientConfig {
            api_url: "http://localhost:0".to_string(),
            api_key: None,
        };
        assert!(run_execute(config, "   ").await.is_err());
    }

    #[tokio::test]
    async fn test_run_file_reports_missing_file() {
        let config = ClientConfig {
            api_url: "http://localhost:0".to_string(),
            api_key: None,
        };
        let err = run_file(config, Path::new("/nonexistent/prompt.txt")).await.unwrap_err();
        assert!(err.to_string().contains("prompt.txt"));
    }
}
