//! Key codes, keyboard layouts and accelerator parsing

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::errors::DriverError;

/// Linux input event key code.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const ESC: KeyCode = KeyCode(1);
    pub const MINUS: KeyCode = KeyCode(12);
    pub const EQUAL: KeyCode = KeyCode(13);
    pub const BACKSPACE: KeyCode = KeyCode(14);
    pub const TAB: KeyCode = KeyCode(15);
    pub const LEFT_BRACE: KeyCode = KeyCode(26);
    pub const RIGHT_BRACE: KeyCode = KeyCode(27);
    pub const ENTER: KeyCode = KeyCode(28);
    pub const LEFT_CTRL: KeyCode = KeyCode(29);
    pub const SEMICOLON: KeyCode = KeyCode(39);
    pub const APOSTROPHE: KeyCode = KeyCode(40);
    pub const GRAVE: KeyCode = KeyCode(41);
    pub const LEFT_SHIFT: KeyCode = KeyCode(42);
    pub const BACKSLASH: KeyCode = KeyCode(43);
    pub const COMMA: KeyCode = KeyCode(51);
    pub const DOT: KeyCode = KeyCode(52);
    pub const SLASH: KeyCode = KeyCode(53);
    pub const LEFT_ALT: KeyCode = KeyCode(56);
    pub const SPACE: KeyCode = KeyCode(57);
    pub const F1: KeyCode = KeyCode(59);
    pub const F11: KeyCode = KeyCode(87);
    pub const F12: KeyCode = KeyCode(88);
    pub const HOME: KeyCode = KeyCode(102);
    pub const UP: KeyCode = KeyCode(103);
    pub const PAGE_UP: KeyCode = KeyCode(104);
    pub const LEFT: KeyCode = KeyCode(105);
    pub const RIGHT: KeyCode = KeyCode(106);
    pub const END: KeyCode = KeyCode(107);
    pub const DOWN: KeyCode = KeyCode(108);
    pub const PAGE_DOWN: KeyCode = KeyCode(109);
    pub const INSERT: KeyCode = KeyCode(110);
    pub const DELETE: KeyCode = KeyCode(111);
    pub const MUTE: KeyCode = KeyCode(113);
    pub const VOLUME_DOWN: KeyCode = KeyCode(114);
    pub const VOLUME_UP: KeyCode = KeyCode(115);
    pub const SCALE: KeyCode = KeyCode(120);
    pub const LEFT_META: KeyCode = KeyCode(125);
    pub const BACK: KeyCode = KeyCode(158);
    pub const FORWARD: KeyCode = KeyCode(159);
    pub const PLAY_PAUSE: KeyCode = KeyCode(164);
    pub const REFRESH: KeyCode = KeyCode(173);
    pub const BRIGHTNESS_DOWN: KeyCode = KeyCode(224);
    pub const BRIGHTNESS_UP: KeyCode = KeyCode(225);
    pub const ZOOM: KeyCode = KeyCode(372);

    /// `F1`..`F10` are contiguous; `F11`/`F12` are not.
    pub fn function(n: u8) -> Option<KeyCode> {
        match n {
            1..=10 => Some(KeyCode(Self::F1.0 + u16::from(n) - 1)),
            11 => Some(Self::F11),
            12 => Some(Self::F12),
            _ => None,
        }
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key#{}", self.0)
    }
}

bitflags! {
    /// Modifier set of an accelerator.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct KeyMod: u8 {
        const CTRL = 0b0001;
        const ALT = 0b0010;
        const SHIFT = 0b0100;
        const SEARCH = 0b1000;
    }
}

impl KeyMod {
    /// Press order; release runs in reverse.
    pub const ORDER: [(KeyMod, KeyCode); 4] = [
        (KeyMod::CTRL, KeyCode::LEFT_CTRL),
        (KeyMod::ALT, KeyCode::LEFT_ALT),
        (KeyMod::SHIFT, KeyCode::LEFT_SHIFT),
        (KeyMod::SEARCH, KeyCode::LEFT_META),
    ];

    fn from_modifier_name(name: &str) -> Option<KeyMod> {
        match name {
            "ctrl" | "control" => Some(KeyMod::CTRL),
            "alt" => Some(KeyMod::ALT),
            "shift" => Some(KeyMod::SHIFT),
            "search" | "launcher" | "meta" => Some(KeyMod::SEARCH),
            _ => None,
        }
    }

    /// Key codes of the set modifiers in press order.
    pub fn codes(&self) -> Vec<KeyCode> {
        Self::ORDER
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, code)| *code)
            .collect()
    }
}

/// What the physical top row of the keyboard emits.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopRowLayout {
    /// F1..F10 carry back, forward, refresh, fullscreen, overview, brightness and volume.
    #[default]
    Legacy,
    /// Newer top row without a forward key; F7 is play/pause.
    Layout2,
    /// Dedicated action scancodes instead of function keys.
    ActionKeys,
}

/// Keyboard layout used to resolve key names.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeyboardLayout {
    #[serde(default)]
    pub top_row: TopRowLayout,
}

impl KeyboardLayout {
    pub fn new(top_row: TopRowLayout) -> Self {
        Self { top_row }
    }

    fn top_row_key(&self, name: &str) -> Option<KeyCode> {
        const LEGACY: [&str; 10] = [
            "back",
            "forward",
            "refresh",
            "fullscreen",
            "overview",
            "brightnessdown",
            "brightnessup",
            "volumemute",
            "volumedown",
            "volumeup",
        ];
        const LAYOUT2: [&str; 10] = [
            "back",
            "refresh",
            "fullscreen",
            "overview",
            "brightnessdown",
            "brightnessup",
            "playpause",
            "volumemute",
            "volumedown",
            "volumeup",
        ];
        let name = match name {
            "zoom" | "zoomtoggle" => "fullscreen",
            "selecttask" | "scale" => "overview",
            "mute" => "volumemute",
            other => other,
        };
        let position = |table: &[&str; 10]| {
            table
                .iter()
                .position(|entry| *entry == name)
                .and_then(|idx| KeyCode::function(idx as u8 + 1))
        };
        match self.top_row {
            TopRowLayout::Legacy => position(&LEGACY),
            TopRowLayout::Layout2 => position(&LAYOUT2),
            TopRowLayout::ActionKeys => match name {
                "back" => Some(KeyCode::BACK),
                "forward" => Some(KeyCode::FORWARD),
                "refresh" => Some(KeyCode::REFRESH),
                "fullscreen" => Some(KeyCode::ZOOM),
                "overview" => Some(KeyCode::SCALE),
                "brightnessdown" => Some(KeyCode::BRIGHTNESS_DOWN),
                "brightnessup" => Some(KeyCode::BRIGHTNESS_UP),
                "playpause" => Some(KeyCode::PLAY_PAUSE),
                "volumemute" => Some(KeyCode::MUTE),
                "volumedown" => Some(KeyCode::VOLUME_DOWN),
                "volumeup" => Some(KeyCode::VOLUME_UP),
                _ => None,
            },
        }
    }

    /// Resolves a key name such as `Tab`, `F5`, `a`, `Search` or `Overview`.
    pub fn key(&self, name: &str) -> Result<KeyCode, DriverError> {
        let lower = name.trim().to_ascii_lowercase();
        if let Some(modifier) = KeyMod::from_modifier_name(&lower) {
            return Ok(modifier.codes()[0]);
        }
        let named = match lower.as_str() {
            "esc" | "escape" => Some(KeyCode::ESC),
            "tab" => Some(KeyCode::TAB),
            "enter" | "return" => Some(KeyCode::ENTER),
            "backspace" => Some(KeyCode::BACKSPACE),
            "space" => Some(KeyCode::SPACE),
            "up" => Some(KeyCode::UP),
            "down" => Some(KeyCode::DOWN),
            "left" => Some(KeyCode::LEFT),
            "right" => Some(KeyCode::RIGHT),
            "home" => Some(KeyCode::HOME),
            "end" => Some(KeyCode::END),
            "pageup" => Some(KeyCode::PAGE_UP),
            "pagedown" => Some(KeyCode::PAGE_DOWN),
            "insert" => Some(KeyCode::INSERT),
            "delete" | "del" => Some(KeyCode::DELETE),
            _ => None,
        };
        if let Some(code) = named {
            return Ok(code);
        }
        if let Some(n) = lower.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            return KeyCode::function(n).ok_or_else(|| DriverError::InvalidKey(name.to_string()));
        }
        if let Some(code) = self.top_row_key(&lower) {
            return Ok(code);
        }
        let mut chars = lower.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Some((code, _)) = char_key(c) {
                return Ok(code);
            }
        }
        Err(DriverError::InvalidKey(name.to_string()))
    }

    /// Key and shift state that produce `c`.
    pub fn char_key(&self, c: char) -> Result<(KeyCode, bool), DriverError> {
        char_key(c).ok_or(DriverError::Untypeable(c))
    }
}

/// US-QWERTY mapping from a character to its key and shift state.
fn char_key(c: char) -> Option<(KeyCode, bool)> {
    const LETTERS: &str = "qwertyuiop";
    const HOME_ROW: &str = "asdfghjkl";
    const BOTTOM_ROW: &str = "zxcvbnm";
    const DIGITS: &str = "1234567890";
    const SHIFTED_DIGITS: &str = "!@#$%^&*()";

    let lower = c.to_ascii_lowercase();
    let shifted_letter = c.is_ascii_uppercase();
    let rows: [(&str, u16); 4] = [(DIGITS, 2), (LETTERS, 16), (HOME_ROW, 30), (BOTTOM_ROW, 44)];
    for (row, base) in rows {
        if let Some(idx) = row.find(lower) {
            return Some((KeyCode(base + idx as u16), shifted_letter));
        }
    }
    if let Some(idx) = SHIFTED_DIGITS.find(c) {
        return Some((KeyCode(2 + idx as u16), true));
    }
    let symbol = match c {
        ' ' => (KeyCode::SPACE, false),
        '\n' => (KeyCode::ENTER, false),
        '\t' => (KeyCode::TAB, false),
        '-' => (KeyCode::MINUS, false),
        '_' => (KeyCode::MINUS, true),
        '=' => (KeyCode::EQUAL, false),
        '+' => (KeyCode::EQUAL, true),
        '[' => (KeyCode::LEFT_BRACE, false),
        '{' => (KeyCode::LEFT_BRACE, true),
        ']' => (KeyCode::RIGHT_BRACE, false),
        '}' => (KeyCode::RIGHT_BRACE, true),
        ';' => (KeyCode::SEMICOLON, false),
        ':' => (KeyCode::SEMICOLON, true),
        '\'' => (KeyCode::APOSTROPHE, false),
        '"' => (KeyCode::APOSTROPHE, true),
        '`' => (KeyCode::GRAVE, false),
        '~' => (KeyCode::GRAVE, true),
        '\\' => (KeyCode::BACKSLASH, false),
        '|' => (KeyCode::BACKSLASH, true),
        ',' => (KeyCode::COMMA, false),
        '<' => (KeyCode::COMMA, true),
        '.' => (KeyCode::DOT, false),
        '>' => (KeyCode::DOT, true),
        '/' => (KeyCode::SLASH, false),
        '?' => (KeyCode::SLASH, true),
        _ => return None,
    };
    Some(symbol)
}

/// A parsed accelerator such as `Ctrl+Shift+Search`.
///
/// The last token is the main key; every earlier token must be a modifier.
/// Modifier order in the text does not matter.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Accelerator {
    pub modifiers: KeyMod,
    pub key: KeyCode,
}

impl Accelerator {
    pub fn parse(chord: &str, layout: &KeyboardLayout) -> Result<Self, DriverError> {
        let tokens: Vec<&str> = chord.split('+').map(str::trim).collect();
        if tokens.iter().any(|token| token.is_empty()) {
            return Err(DriverError::InvalidKey(chord.to_string()));
        }
        let Some((main, modifier_tokens)) = tokens.split_last() else {
            return Err(DriverError::InvalidKey(chord.to_string()));
        };

        let mut modifiers = KeyMod::empty();
        for token in modifier_tokens {
            let flag = KeyMod::from_modifier_name(&token.to_ascii_lowercase())
                .ok_or_else(|| DriverError::InvalidKey(format!("{} in {}", token, chord)))?;
            if modifiers.contains(flag) {
                return Err(DriverError::InvalidKey(format!(
                    "duplicate modifier {} in {}",
                    token, chord
                )));
            }
            modifiers |= flag;
        }

        let key = layout.key(main)?;
        Ok(Self { modifiers, key })
    }

    /// Codes to press, in order. The main key comes last and is not repeated
    /// when it is itself one of the modifiers.
    pub fn press_sequence(&self) -> Vec<KeyCode> {
        let mut codes = self.modifiers.codes();
        if !codes.contains(&self.key) {
            codes.push(self.key);
        }
        codes
    }
}
