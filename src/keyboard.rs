//! Hangul input through the on-screen keyboard
//!
//! Android's `input text` only injects ASCII-safe key events, so Korean
//! queries cannot be typed through it. Instead each syllable is decomposed
//! into its jamo and the Gboard Korean layout is tapped key by key. Key
//! positions are measured on a 720x1440 screen and scaled to the live
//! viewport; double consonants are entered as shift + base key.

use crate::device::Device;
use crate::error::Result;
use crate::human;

/// Reference screen the key positions were measured on
const BASE_WIDTH: f64 = 720.0;
const BASE_HEIGHT: f64 = 1440.0;

/// Tap jitter on keyboard keys, tighter than content taps since keys are small
const KEY_JITTER: (i32, i32) = (8, 5);
const SHIFT_JITTER: (i32, i32) = (5, 3);

const CHOSUNG: [char; 19] = [
    'ㄱ', 'ㄲ', 'ㄴ', 'ㄷ', 'ㄸ', 'ㄹ', 'ㅁ', 'ㅂ', 'ㅃ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅉ', 'ㅊ',
    'ㅋ', 'ㅌ', 'ㅍ', 'ㅎ',
];
const JUNGSUNG: [char; 21] = [
    'ㅏ', 'ㅐ', 'ㅑ', 'ㅒ', 'ㅓ', 'ㅔ', 'ㅕ', 'ㅖ', 'ㅗ', 'ㅘ', 'ㅙ', 'ㅚ', 'ㅛ', 'ㅜ', 'ㅝ',
    'ㅞ', 'ㅟ', 'ㅠ', 'ㅡ', 'ㅢ', 'ㅣ',
];
// Final consonants, 1-based in the syllable arithmetic (index 0 means none)
const JONGSUNG: [char; 27] = [
    'ㄱ', 'ㄲ', 'ㄳ', 'ㄴ', 'ㄵ', 'ㄶ', 'ㄷ', 'ㄹ', 'ㄺ', 'ㄻ', 'ㄼ', 'ㄽ', 'ㄾ', 'ㄿ', 'ㅀ',
    'ㅁ', 'ㅂ', 'ㅄ', 'ㅅ', 'ㅆ', 'ㅇ', 'ㅈ', 'ㅊ', 'ㅋ', 'ㅌ', 'ㅍ', 'ㅎ',
];

/// One key of the Gboard Korean layout, in reference-screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Key {
    x: i32,
    y: i32,
    shift: bool,
}

const fn key(x: i32, y: i32) -> Key {
    Key { x, y, shift: false }
}

const fn shifted(x: i32, y: i32) -> Key {
    Key { x, y, shift: true }
}

const SHIFT_KEY: Key = key(54, 1194);
const SPACE_KEY: Key = key(360, 1266);

fn key_for(jamo: char) -> Option<Key> {
    let k = match jamo {
        // Top letter row
        'ㅂ' => key(24, 1050),
        'ㅈ' => key(96, 1050),
        'ㄷ' => key(168, 1050),
        'ㄱ' => key(240, 1050),
        'ㅅ' => key(312, 1050),
        'ㅛ' => key(384, 1050),
        'ㅕ' => key(456, 1050),
        'ㅑ' => key(528, 1050),
        'ㅐ' => key(600, 1050),
        'ㅔ' => key(672, 1050),
        // Home row
        'ㅁ' => key(40, 1122),
        'ㄴ' => key(120, 1122),
        'ㅇ' => key(200, 1122),
        'ㄹ' => key(280, 1122),
        'ㅎ' => key(360, 1122),
        'ㅗ' => key(440, 1122),
        'ㅓ' => key(520, 1122),
        'ㅏ' => key(600, 1122),
        'ㅣ' => key(680, 1122),
        // Bottom letter row
        'ㅋ' => key(132, 1194),
        'ㅌ' => key(204, 1194),
        'ㅊ' => key(276, 1194),
        'ㅍ' => key(348, 1194),
        'ㅠ' => key(420, 1194),
        'ㅜ' => key(492, 1194),
        'ㅡ' => key(564, 1194),
        // Doubles live on the shift layer of their base key
        'ㄲ' => shifted(240, 1050),
        'ㄸ' => shifted(168, 1050),
        'ㅃ' => shifted(24, 1050),
        'ㅆ' => shifted(312, 1050),
        'ㅉ' => shifted(96, 1050),
        ' ' => SPACE_KEY,
        ',' => key(162, 1266),
        '.' => key(558, 1266),
        _ => return None,
    };
    Some(k)
}

/// Whether any character needs the keyboard path
pub fn contains_hangul(text: &str) -> bool {
    text.chars()
        .any(|c| matches!(c, '\u{AC00}'..='\u{D7A3}' | '\u{3131}'..='\u{3163}'))
}

/// Decompose text into the jamo tap sequence
///
/// Syllables split into initial/vowel/final; compound vowels and compound
/// finals expand into the two keys that compose them on the keyboard. Bare
/// jamo and non-Hangul characters pass through unchanged.
pub fn decompose(text: &str) -> Vec<char> {
    let mut out = Vec::new();
    for ch in text.chars() {
        match ch {
            '가'..='힣' => {
                let code = ch as u32 - 0xAC00;
                let cho = (code / 588) as usize;
                let jung = ((code % 588) / 28) as usize;
                let jong = (code % 28) as usize;
                out.push(CHOSUNG[cho]);
                push_vowel(&mut out, JUNGSUNG[jung]);
                if jong > 0 {
                    push_final(&mut out, JONGSUNG[jong - 1]);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

fn push_vowel(out: &mut Vec<char>, v: char) {
    match v {
        'ㅘ' => out.extend(['ㅗ', 'ㅏ']),
        'ㅙ' => out.extend(['ㅗ', 'ㅐ']),
        'ㅚ' => out.extend(['ㅗ', 'ㅣ']),
        'ㅝ' => out.extend(['ㅜ', 'ㅓ']),
        'ㅞ' => out.extend(['ㅜ', 'ㅔ']),
        'ㅟ' => out.extend(['ㅜ', 'ㅣ']),
        'ㅢ' => out.extend(['ㅡ', 'ㅣ']),
        'ㅒ' => out.extend(['ㅑ', 'ㅣ']),
        'ㅖ' => out.extend(['ㅕ', 'ㅣ']),
        _ => out.push(v),
    }
}

fn push_final(out: &mut Vec<char>, j: char) {
    match j {
        'ㄳ' => out.extend(['ㄱ', 'ㅅ']),
        'ㄵ' => out.extend(['ㄴ', 'ㅈ']),
        'ㄶ' => out.extend(['ㄴ', 'ㅎ']),
        'ㄺ' => out.extend(['ㄹ', 'ㄱ']),
        'ㄻ' => out.extend(['ㄹ', 'ㅁ']),
        'ㄼ' => out.extend(['ㄹ', 'ㅂ']),
        'ㄽ' => out.extend(['ㄹ', 'ㅅ']),
        'ㄾ' => out.extend(['ㄹ', 'ㅌ']),
        'ㄿ' => out.extend(['ㄹ', 'ㅍ']),
        'ㅀ' => out.extend(['ㄹ', 'ㅎ']),
        'ㅄ' => out.extend(['ㅂ', 'ㅅ']),
        _ => out.push(j),
    }
}

/// Type text through the on-screen Korean keyboard
///
/// Characters that have no key (latin letters mixed into a Korean query)
/// fall back to the device's text injection one at a time.
pub async fn type_korean(device: &dyn Device, text: &str) -> Result<()> {
    let vp = device.viewport();
    let sx = vp.width as f64 / BASE_WIDTH;
    let sy = vp.height as f64 / BASE_HEIGHT;

    for jamo in decompose(text) {
        match key_for(jamo) {
            Some(k) => {
                if k.shift {
                    tap_key(device, SHIFT_KEY, sx, sy, SHIFT_JITTER).await?;
                    human::delay_ms(50, 100).await;
                }
                tap_key(device, k, sx, sy, KEY_JITTER).await?;
                human::delay_ms(80, 180).await;
            }
            None => {
                tracing::warn!(character = %jamo, "no key on layout, injecting as text");
                let mut buf = [0u8; 4];
                device.input_text(jamo.encode_utf8(&mut buf)).await?;
                human::delay_ms(80, 180).await;
            }
        }
    }
    Ok(())
}

async fn tap_key(device: &dyn Device, k: Key, sx: f64, sy: f64, jitter: (i32, i32)) -> Result<()> {
    let x = (k.x as f64 * sx) as i32 + human::random_i32(-jitter.0, jitter.0);
    let y = (k.y as f64 * sy) as i32 + human::random_i32(-jitter.1, jitter.1);
    device.tap(x, y).await
}
