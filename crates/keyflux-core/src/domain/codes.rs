//! Physical key code constants, numbered like the Linux input event codes so
//! grabbed events map onto [`Key::Code`](crate::domain::key::Key) without
//! translation.
//!
//! The wheel pseudo-codes sit above the kernel's code range; they let wheel
//! motion participate in mappings as momentary key presses. The virtual
//! device converts unmapped wheel presses back into relative wheel events.

use crate::domain::key::KeyCode;

pub const KEY_ESC: KeyCode = 1;
pub const KEY_1: KeyCode = 2;
pub const KEY_2: KeyCode = 3;
pub const KEY_3: KeyCode = 4;
pub const KEY_4: KeyCode = 5;
pub const KEY_5: KeyCode = 6;
pub const KEY_6: KeyCode = 7;
pub const KEY_7: KeyCode = 8;
pub const KEY_8: KeyCode = 9;
pub const KEY_9: KeyCode = 10;
pub const KEY_0: KeyCode = 11;
pub const KEY_MINUS: KeyCode = 12;
pub const KEY_EQUAL: KeyCode = 13;
pub const KEY_BACKSPACE: KeyCode = 14;
pub const KEY_TAB: KeyCode = 15;
pub const KEY_Q: KeyCode = 16;
pub const KEY_W: KeyCode = 17;
pub const KEY_E: KeyCode = 18;
pub const KEY_R: KeyCode = 19;
pub const KEY_T: KeyCode = 20;
pub const KEY_Y: KeyCode = 21;
pub const KEY_U: KeyCode = 22;
pub const KEY_I: KeyCode = 23;
pub const KEY_O: KeyCode = 24;
pub const KEY_P: KeyCode = 25;
pub const KEY_ENTER: KeyCode = 28;
pub const KEY_LEFTCTRL: KeyCode = 29;
pub const KEY_A: KeyCode = 30;
pub const KEY_S: KeyCode = 31;
pub const KEY_D: KeyCode = 32;
pub const KEY_F: KeyCode = 33;
pub const KEY_G: KeyCode = 34;
pub const KEY_H: KeyCode = 35;
pub const KEY_J: KeyCode = 36;
pub const KEY_K: KeyCode = 37;
pub const KEY_L: KeyCode = 38;
pub const KEY_SEMICOLON: KeyCode = 39;
pub const KEY_LEFTSHIFT: KeyCode = 42;
pub const KEY_Z: KeyCode = 44;
pub const KEY_X: KeyCode = 45;
pub const KEY_C: KeyCode = 46;
pub const KEY_V: KeyCode = 47;
pub const KEY_B: KeyCode = 48;
pub const KEY_N: KeyCode = 49;
pub const KEY_M: KeyCode = 50;
pub const KEY_RIGHTSHIFT: KeyCode = 54;
pub const KEY_LEFTALT: KeyCode = 56;
pub const KEY_SPACE: KeyCode = 57;
pub const KEY_CAPSLOCK: KeyCode = 58;
pub const KEY_F1: KeyCode = 59;
pub const KEY_F2: KeyCode = 60;
pub const KEY_F3: KeyCode = 61;
pub const KEY_F4: KeyCode = 62;
pub const KEY_F5: KeyCode = 63;
pub const KEY_F6: KeyCode = 64;
pub const KEY_RIGHTCTRL: KeyCode = 97;
pub const KEY_RIGHTALT: KeyCode = 100;
pub const KEY_HOME: KeyCode = 102;
pub const KEY_UP: KeyCode = 103;
pub const KEY_PAGEUP: KeyCode = 104;
pub const KEY_LEFT: KeyCode = 105;
pub const KEY_RIGHT: KeyCode = 106;
pub const KEY_END: KeyCode = 107;
pub const KEY_DOWN: KeyCode = 108;
pub const KEY_PAGEDOWN: KeyCode = 109;
pub const KEY_INSERT: KeyCode = 110;
pub const KEY_DELETE: KeyCode = 111;
pub const KEY_LEFTMETA: KeyCode = 125;
pub const KEY_RIGHTMETA: KeyCode = 126;

pub const BTN_LEFT: KeyCode = 0x110;
pub const BTN_RIGHT: KeyCode = 0x111;
pub const BTN_MIDDLE: KeyCode = 0x112;
pub const BTN_SIDE: KeyCode = 0x113;
pub const BTN_EXTRA: KeyCode = 0x114;
pub const BTN_FORWARD: KeyCode = 0x115;
pub const BTN_BACK: KeyCode = 0x116;
pub const BTN_TASK: KeyCode = 0x117;

// Pseudo-codes for relative wheel motion, outside the kernel code range.
pub const WHEEL_UP: KeyCode = 0x400;
pub const WHEEL_DOWN: KeyCode = 0x401;
pub const WHEEL_LEFT: KeyCode = 0x402;
pub const WHEEL_RIGHT: KeyCode = 0x403;

/// Returns `true` for mouse button codes.
pub fn is_button(code: KeyCode) -> bool {
    (BTN_LEFT..=BTN_TASK).contains(&code)
}

/// Returns `true` for the wheel pseudo-codes.
pub fn is_wheel(code: KeyCode) -> bool {
    (WHEEL_UP..=WHEEL_RIGHT).contains(&code)
}

/// Human-readable name for a key code, for logs and diagnostics.
pub fn name(code: KeyCode) -> Option<&'static str> {
    Some(match code {
        KEY_ESC => "Escape",
        KEY_1 => "1",
        KEY_2 => "2",
        KEY_3 => "3",
        KEY_4 => "4",
        KEY_5 => "5",
        KEY_6 => "6",
        KEY_7 => "7",
        KEY_8 => "8",
        KEY_9 => "9",
        KEY_0 => "0",
        KEY_MINUS => "Minus",
        KEY_EQUAL => "Equal",
        KEY_BACKSPACE => "Backspace",
        KEY_TAB => "Tab",
        KEY_Q => "Q",
        KEY_W => "W",
        KEY_E => "E",
        KEY_R => "R",
        KEY_T => "T",
        KEY_Y => "Y",
        KEY_U => "U",
        KEY_I => "I",
        KEY_O => "O",
        KEY_P => "P",
        KEY_ENTER => "Enter",
        KEY_LEFTCTRL => "LeftCtrl",
        KEY_A => "A",
        KEY_S => "S",
        KEY_D => "D",
        KEY_F => "F",
        KEY_G => "G",
        KEY_H => "H",
        KEY_J => "J",
        KEY_K => "K",
        KEY_L => "L",
        KEY_SEMICOLON => "Semicolon",
        KEY_LEFTSHIFT => "LeftShift",
        KEY_Z => "Z",
        KEY_X => "X",
        KEY_C => "C",
        KEY_V => "V",
        KEY_B => "B",
        KEY_N => "N",
        KEY_M => "M",
        KEY_RIGHTSHIFT => "RightShift",
        KEY_LEFTALT => "LeftAlt",
        KEY_SPACE => "Space",
        KEY_CAPSLOCK => "CapsLock",
        KEY_F1 => "F1",
        KEY_F2 => "F2",
        KEY_F3 => "F3",
        KEY_F4 => "F4",
        KEY_F5 => "F5",
        KEY_F6 => "F6",
        KEY_RIGHTCTRL => "RightCtrl",
        KEY_RIGHTALT => "RightAlt",
        KEY_HOME => "Home",
        KEY_UP => "Up",
        KEY_PAGEUP => "PageUp",
        KEY_LEFT => "Left",
        KEY_RIGHT => "Right",
        KEY_END => "End",
        KEY_DOWN => "Down",
        KEY_PAGEDOWN => "PageDown",
        KEY_INSERT => "Insert",
        KEY_DELETE => "Delete",
        KEY_LEFTMETA => "LeftMeta",
        KEY_RIGHTMETA => "RightMeta",
        BTN_LEFT => "ButtonLeft",
        BTN_RIGHT => "ButtonRight",
        BTN_MIDDLE => "ButtonMiddle",
        BTN_SIDE => "ButtonSide",
        BTN_EXTRA => "ButtonExtra",
        BTN_FORWARD => "ButtonForward",
        BTN_BACK => "ButtonBack",
        BTN_TASK => "ButtonTask",
        WHEEL_UP => "WheelUp",
        WHEEL_DOWN => "WheelDown",
        WHEEL_LEFT => "WheelLeft",
        WHEEL_RIGHT => "WheelRight",
        _ => return Option::None,
    })
}
