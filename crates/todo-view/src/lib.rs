//! Todo 一覧と各行のヘッドレスなビューモデル
//!
//! 描画は `TodoListScreen` / `TodoItemRow` の値として返し、表示方法は利用側に任せます。

pub mod item;
pub mod list;
pub mod screen;

pub use item::*;
pub use list::*;
pub use screen::*;
