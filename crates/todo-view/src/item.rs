use std::fmt;
use todo_domain::TodoId;

/// 1 件分の Todo 行
///
/// 表示は引数だけで決まり、コールバックは ID を呼び出し側へ渡すだけ。
pub struct TodoItemView<'a, T, D> {
    id: &'a TodoId,
    text: &'a str,
    completed: bool,
    on_toggle: T,
    on_delete: D,
}

impl<'a, T, D, R> TodoItemView<'a, T, D>
where
    T: Fn(&TodoId) -> R,
    D: Fn(&TodoId) -> R,
{
    pub fn new(id: &'a TodoId, text: &'a str, completed: bool, on_toggle: T, on_delete: D) -> Self {
        Self {
            id,
            text,
            completed,
            on_toggle,
            on_delete,
        }
    }

    /// チェックボックスの操作
    pub fn toggle(&self) -> R {
        (self.on_toggle)(self.id)
    }

    /// Delete ボタンの操作
    pub fn delete(&self) -> R {
        (self.on_delete)(self.id)
    }

    pub fn render(&self) -> TodoItemRow {
        TodoItemRow {
            id: self.id.clone(),
            dom_id: format!("todo-{}", self.id),
            text: self.text.to_string(),
            checked: self.completed,
        }
    }
}

/// 描画済みの行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoItemRow {
    pub id: TodoId,
    /// チェックボックスとラベルを結ぶ要素 ID
    pub dom_id: String,
    pub text: String,
    pub checked: bool,
}

impl TodoItemRow {
    /// 完了済みは打ち消し線付きで表示される
    pub fn is_struck_through(&self) -> bool {
        self.checked
    }

    /// 表示用ラベル。打ち消し線は `~~text~~` で表す
    pub fn label(&self) -> String {
        if self.is_struck_through() {
            format!("~~{}~~", self.text)
        } else {
            self.text.clone()
        }
    }
}

impl fmt::Display for TodoItemRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.checked { "x" } else { " " };
        write!(f, "[{}] {} (Delete)", mark, self.label())
    }
}
