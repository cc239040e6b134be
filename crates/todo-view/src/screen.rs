use crate::TodoItemRow;
use std::fmt;

pub const SIGN_IN_PROMPT: &str = "Please sign in to manage your todos";
pub const EMPTY_MESSAGE: &str = "No todos yet. Add some!";
pub const LIST_TITLE: &str = "Todo List";
pub const ADD_TODO_LABEL: &str = "Add Todo";
pub const DIALOG_TITLE: &str = "Add a new todo";
pub const INPUT_PLACEHOLDER: &str = "Enter your task...";
pub const SUBMIT_LABEL: &str = "Add Task";

/// 一覧画面の 3 状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenState {
    /// 未認証。操作手段は出さない
    SignInPrompt,
    /// 認証済みで、一覧が読み込み中または 0 件
    Empty,
    Populated,
}

/// 追加ダイアログが開いているときの表示内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTodoDialog {
    pub text: String,
}

/// `TodoListView::render` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoListScreen {
    pub state: ScreenState,
    pub rows: Vec<TodoItemRow>,
    pub dialog: Option<AddTodoDialog>,
    pub notifications: Vec<String>,
}

impl TodoListScreen {
    pub fn sign_in_prompt() -> Self {
        Self {
            state: ScreenState::SignInPrompt,
            rows: Vec::new(),
            dialog: None,
            notifications: Vec::new(),
        }
    }

    /// 追加ボタンを表示するか
    pub fn shows_add_affordance(&self) -> bool {
        self.state != ScreenState::SignInPrompt
    }
}

impl fmt::Display for TodoListScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.state == ScreenState::SignInPrompt {
            return writeln!(f, "{SIGN_IN_PROMPT}");
        }

        writeln!(f, "{LIST_TITLE} [{ADD_TODO_LABEL}]")?;
        for notification in &self.notifications {
            writeln!(f, "! {notification}")?;
        }
        if let Some(dialog) = &self.dialog {
            let text = if dialog.text.is_empty() {
                INPUT_PLACEHOLDER
            } else {
                dialog.text.as_str()
            };
            writeln!(f, "{DIALOG_TITLE}: Task \"{text}\" [{SUBMIT_LABEL}]")?;
        }
        writeln!(f, "---")?;

        match self.state {
            ScreenState::Empty => writeln!(f, "{EMPTY_MESSAGE}"),
            _ => self.rows.iter().try_for_each(|row| writeln!(f, "{row}")),
        }
    }
}
