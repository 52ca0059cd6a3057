//! Top-level interactive menu.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    RunClone,
    ShowStatus,
    Update,
    Exit,
}

impl MenuChoice {
    pub const ALL: [MenuChoice; 4] = [
        MenuChoice::RunClone,
        MenuChoice::ShowStatus,
        MenuChoice::Update,
        MenuChoice::Exit,
    ];

    pub fn key(&self) -> char {
        match self {
            MenuChoice::RunClone => '1',
            MenuChoice::ShowStatus => '2',
            MenuChoice::Update => '3',
            MenuChoice::Exit => '4',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MenuChoice::RunClone => "Run Full Clone",
            MenuChoice::ShowStatus => "Show Status",
            MenuChoice::Update => "Update Script",
            MenuChoice::Exit => "Exit",
        }
    }
}

impl fmt::Display for MenuChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}) {}", self.key(), self.label())
    }
}

/// Map an answer to a menu entry. Only the bare digit is accepted.
pub fn parse_choice(input: &str) -> Option<MenuChoice> {
    let mut chars = input.trim().chars();
    let key = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    MenuChoice::ALL.into_iter().find(|c| c.key() == key)
}

pub fn render_menu() -> String {
    let mut out = String::from("diskclone\n");
    for choice in MenuChoice::ALL {
        out.push_str(&format!("  {choice}\n"));
    }
    out
}
