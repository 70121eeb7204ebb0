//! Glitch melody virtual machine
//!
//! A melody is a tiny stack program: runs of hexadecimal digits push
//! literals, and single letters apply operations. The whole program is
//! re-evaluated for every sample index `t` over a 256-slot circular stack
//! that persists between samples, and the low byte of the final stack top
//! is the audio sample.
#![warn(missing_docs)]

use std::collections::BTreeSet;
use std::fmt;

use log::warn;
use thiserror::Error;

/// Maximum number of characters in a program line
pub const LINE_WIDTH: usize = 16;

/// Maximum number of program lines in a melody, not counting the title
pub const LINE_COUNT: usize = 16;

/// Errors produced when loading or editing melody text
#[derive(Debug, Error, Eq, PartialEq)]
pub enum MelodyError {
    /// A program line exceeds [`LINE_WIDTH`] characters
    #[error("line {index} is {len} characters, the limit is {LINE_WIDTH}")]
    LineTooLong {
        /// 0-based program line index
        index: usize,
        /// Length of the offending line
        len: usize,
    },

    /// The melody has more than [`LINE_COUNT`] program lines
    #[error("melody has {count} lines, the limit is {LINE_COUNT}")]
    TooManyLines {
        /// Number of program lines in the input
        count: usize,
    },

    /// An edit addressed a cell outside the program grid
    #[error("position ({row}, {col}) is outside the program grid")]
    BadPosition {
        /// 0-based program line index
        row: usize,
        /// 0-based column within the line
        col: usize,
    },

    /// An edit tried to write a character outside 7-bit ASCII
    #[error("character {0:?} is not ASCII")]
    BadCharacter(char),
}

/// Fixed 256-slot circular stack of `u32` values
///
/// The stack is never drained: a pop rotates the top index backwards so
/// the buried slot beneath it resurfaces, and a push overwrites the oldest
/// slot. Every operation is O(1) and the stack always holds exactly 256
/// values, so deep indexing (PUT, PICK) stays stable across pops.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Stack {
    data: [u32; 256],

    /// Index of the top slot; `push` advances it
    top: u8,
}

impl Default for Stack {
    fn default() -> Self {
        Self {
            data: [0; 256],
            top: 0,
        }
    }
}

impl Stack {
    /// Reads the top of the stack
    #[inline]
    pub fn top(&self) -> u32 {
        self.data[usize::from(self.top)]
    }

    /// Reads the slot `offset` entries below the top, wrapping at 256
    #[inline]
    pub fn at(&self, offset: u8) -> u32 {
        self.data[usize::from(self.top.wrapping_sub(offset))]
    }

    /// Overwrites the top of the stack
    #[inline]
    pub fn set_top(&mut self, v: u32) {
        self.data[usize::from(self.top)] = v;
    }

    /// Overwrites the slot `offset` entries below the top
    #[inline]
    pub fn set_at(&mut self, offset: u8, v: u32) {
        self.data[usize::from(self.top.wrapping_sub(offset))] = v;
    }

    /// Pushes a value; the slot that was oldest is overwritten
    #[inline]
    pub fn push(&mut self, v: u32) {
        self.top = self.top.wrapping_add(1);
        self.data[usize::from(self.top)] = v;
    }

    /// Pops the top value by rotating the ring
    ///
    /// The popped slot is not cleared; it becomes the oldest entry and a
    /// buried value resurfaces as the new top.
    #[inline]
    pub fn pop(&mut self) -> u32 {
        let out = self.top();
        self.top = self.top.wrapping_sub(1);
        out
    }

    /// Zeroes every slot and returns the top index to its starting slot
    ///
    /// Idempotent; a fresh stack and a reset stack are indistinguishable.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Copies the stack contents, depth-ordered: index 0 is the top
    pub fn snapshot(&self) -> [u32; 256] {
        let mut out = [0; 256];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.at(i as u8);
        }
        out
    }
}

/// A single melody instruction, decoded at tokenize time
///
/// Decoding characters once up front keeps the per-sample loop a dense
/// match instead of repeated character dispatch.
///
/// For the binary operators, `a` is the stack top and `b` the slot below
/// it; both operand slots collapse into one result slot and a zero enters
/// at the oldest end of the ring.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Token {
    /// Push a literal value
    Push(u32),
    /// Push the current sample index
    T,
    /// Store `b` at depth `(a & 0xFF) + 1`, consuming the index `a`
    Put,
    /// Rotate the top off the stack
    Drop,
    /// `b * a`, wrapping
    Mul,
    /// `b / a`, or 0 when `a` is 0
    Div,
    /// `b + a`, wrapping
    Add,
    /// `b - a`, wrapping
    Sub,
    /// `b mod a`, or 0 when `a` is 0
    Mod,
    /// `b << a`, or 0 when `a` is 32 or more
    Lshift,
    /// `b >> a` (logical), or 0 when `a` is 32 or more
    Rshift,
    /// `b & a`
    And,
    /// `b | a`
    Or,
    /// `b ^ a`
    Xor,
    /// Bitwise complement of the top, in place
    Not,
    /// Push a copy of the top
    Dup,
    /// Replace the top with the slot it indexes, starting just below it
    Pick,
    /// Exchange the top two slots in place
    Swap,
    /// All-ones if `b < a`, else 0
    Lt,
    /// All-ones if `b > a`, else 0
    Gt,
    /// All-ones if `b == a`, else 0
    Eq,
    /// A character with no implementation; skipped with a warning
    Unknown(char),
}

fn opcode(c: char) -> Token {
    match c {
        'a' => Token::T,
        'b' => Token::Put,
        'c' => Token::Drop,
        'd' => Token::Mul,
        'e' => Token::Div,
        'f' => Token::Add,
        'g' => Token::Sub,
        'h' => Token::Mod,
        'j' => Token::Lshift,
        'k' => Token::Rshift,
        'l' => Token::And,
        'm' => Token::Or,
        'n' => Token::Xor,
        'o' => Token::Not,
        'p' => Token::Dup,
        'q' => Token::Pick,
        'r' => Token::Swap,
        's' => Token::Lt,
        't' => Token::Gt,
        'u' => Token::Eq,
        _ => Token::Unknown(c),
    }
}

/// Decodes a literal digit: `0-9` and uppercase `A-F` only
///
/// Lowercase `a-f` are opcodes, not digits.
fn hex_digit(c: char) -> Option<u32> {
    match c {
        '0'..='9' | 'A'..='F' => c.to_digit(16),
        _ => None,
    }
}

/// Splits program lines into a flat token list
///
/// Literals are maximal runs of hex digits within one line; a run is also
/// cut after eight digits so every literal is an exact `u32`. Lines whose
/// index is in `muted` produce no tokens, and `.` NOPs are dropped here
/// rather than carried to evaluation.
pub fn tokenize(lines: &[String], muted: &BTreeSet<usize>) -> Vec<Token> {
    let mut tokens = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if muted.contains(&i) {
            continue;
        }
        // Literal run in progress, as (value, digit count)
        let mut run: Option<(u32, u32)> = None;
        for c in line.chars() {
            if let Some(d) = hex_digit(c) {
                run = match run {
                    Some((v, n)) if n < 8 => Some((v * 16 + d, n + 1)),
                    Some((v, _)) => {
                        tokens.push(Token::Push(v));
                        Some((d, 1))
                    }
                    None => Some((d, 1)),
                };
            } else {
                if let Some((v, _)) = run.take() {
                    tokens.push(Token::Push(v));
                }
                if c != '.' {
                    tokens.push(opcode(c));
                }
            }
        }
        // Runs never continue across a line boundary
        if let Some((v, _)) = run.take() {
            tokens.push(Token::Push(v));
        }
    }
    tokens
}

/// A melody: title, program lines, mute set, and the derived token list
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Melody {
    title: String,
    lines: Vec<String>,
    muted: BTreeSet<usize>,
    tokens: Vec<Token>,
}

impl Melody {
    /// Parses melody text of the form `title!line1!line2!…`
    ///
    /// Newlines are stripped before splitting, so text read straight from
    /// a file parses as-is. Bytes outside 7-bit ASCII are preserved in
    /// the title but dropped from program lines.
    pub fn new(text: &str) -> Result<Self, MelodyError> {
        let text: String = text.chars().filter(|&c| c != '\n' && c != '\r').collect();
        let mut fields = text.split('!');
        let title = fields.next().unwrap_or_default().to_owned();
        let lines: Vec<String> = fields
            .map(|f| f.chars().filter(char::is_ascii).collect())
            .collect();
        if lines.len() > LINE_COUNT {
            return Err(MelodyError::TooManyLines { count: lines.len() });
        }
        for (index, line) in lines.iter().enumerate() {
            if line.len() > LINE_WIDTH {
                return Err(MelodyError::LineTooLong {
                    index,
                    len: line.len(),
                });
            }
        }
        let mut out = Self {
            title,
            lines,
            muted: BTreeSet::new(),
            tokens: Vec::new(),
        };
        out.retokenize();
        Ok(out)
    }

    fn retokenize(&mut self) {
        self.tokens = tokenize(&self.lines, &self.muted);
    }

    /// The melody's title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Program lines, title excluded
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Muted program line indices, 0-based
    pub fn muted(&self) -> &BTreeSet<usize> {
        &self.muted
    }

    /// The token list derived from the current lines and mute set
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Replaces the mute set and rebuilds the token list
    ///
    /// Any VM that was playing this melody must be reset by the caller.
    pub fn set_muted(&mut self, muted: BTreeSet<usize>) {
        self.muted = muted;
        self.retokenize();
    }

    /// Pads every line with NOPs to [`LINE_WIDTH`] and grows the program
    /// to [`LINE_COUNT`] lines, the fixed grid the editor works on
    ///
    /// Serialization strips the padding again, so expansion is invisible
    /// in the saved form.
    pub fn expand(&mut self) {
        for line in &mut self.lines {
            while line.len() < LINE_WIDTH {
                line.push('.');
            }
        }
        while self.lines.len() < LINE_COUNT {
            self.lines.push(".".repeat(LINE_WIDTH));
        }
    }

    /// Replaces one character of the program grid and rebuilds the token
    /// list
    ///
    /// Any VM that was playing this melody must be reset by the caller.
    pub fn edit_char(&mut self, row: usize, col: usize, c: char) -> Result<(), MelodyError> {
        if !c.is_ascii() {
            return Err(MelodyError::BadCharacter(c));
        }
        let line = self
            .lines
            .get_mut(row)
            .filter(|line| col < line.len())
            .ok_or(MelodyError::BadPosition { row, col })?;
        line.replace_range(col..=col, c.encode_utf8(&mut [0; 4]));
        self.retokenize();
        Ok(())
    }

    /// Canonical text form: trailing NOPs stripped from each line,
    /// trailing empty lines dropped, fields joined with `!`
    ///
    /// A leading `!` appears exactly when the title is empty.
    pub fn serialize(&self) -> String {
        let mut fields: Vec<&str> = Vec::with_capacity(self.lines.len() + 1);
        fields.push(&self.title);
        fields.extend(self.lines.iter().map(|l| l.trim_end_matches('.')));
        while fields.len() > 1 && fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        let out = fields.join("!");
        if out.is_empty() {
            "!".to_owned()
        } else {
            out
        }
    }
}

impl fmt::Display for Melody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// Evaluates a token list once per sample over a persistent [`Stack`]
pub struct Vm {
    stack: Stack,

    /// Unknown opcodes already reported, to keep the log usable at 8 kHz
    warned: [bool; 128],
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Builds a VM with a zeroed stack
    pub fn new() -> Self {
        Self {
            stack: Stack::default(),
            warned: [false; 128],
        }
    }

    /// Shared borrow of the operand stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Zeroes the stack
    ///
    /// Must be called whenever the token list changes or playback
    /// rewinds; between samples the stack deliberately persists.
    pub fn reset(&mut self) {
        self.stack.reset();
    }

    /// Computes the sample at index `t`
    ///
    /// Runs the token list once and returns the low byte of the stack
    /// top. All arithmetic is unsigned 32-bit with wrap-around; division
    /// and modulo by zero and shifts of 32 or more produce 0 instead of
    /// trapping.
    pub fn compute(&mut self, tokens: &[Token], t: u32) -> u8 {
        for &token in tokens {
            match token {
                Token::Push(v) => self.stack.push(v),
                Token::T => self.stack.push(t),
                Token::Put => {
                    let k = (self.stack.top() & 0xFF) as u8;
                    let b = self.stack.at(1);
                    self.stack.set_at(k.wrapping_add(1), b);
                    self.stack.pop();
                }
                Token::Drop => {
                    self.stack.pop();
                }
                Token::Mul => self.bin(|b, a| b.wrapping_mul(a)),
                Token::Div => self.bin(|b, a| if a == 0 { 0 } else { b / a }),
                Token::Add => self.bin(u32::wrapping_add),
                Token::Sub => self.bin(u32::wrapping_sub),
                Token::Mod => self.bin(|b, a| if a == 0 { 0 } else { b % a }),
                Token::Lshift => self.bin(|b, a| b.checked_shl(a).unwrap_or(0)),
                Token::Rshift => self.bin(|b, a| b.checked_shr(a).unwrap_or(0)),
                Token::And => self.bin(|b, a| b & a),
                Token::Or => self.bin(|b, a| b | a),
                Token::Xor => self.bin(|b, a| b ^ a),
                Token::Not => {
                    let v = self.stack.top();
                    self.stack.set_top(!v);
                }
                Token::Dup => self.stack.push(self.stack.top()),
                Token::Pick => {
                    let k = (self.stack.top() & 0xFF) as u8;
                    let v = self.stack.at(k.wrapping_add(1));
                    self.stack.set_top(v);
                }
                Token::Swap => {
                    let a = self.stack.top();
                    let b = self.stack.at(1);
                    self.stack.set_top(b);
                    self.stack.set_at(1, a);
                }
                Token::Lt => self.bin(|b, a| if b < a { u32::MAX } else { 0 }),
                Token::Gt => self.bin(|b, a| if b > a { u32::MAX } else { 0 }),
                Token::Eq => self.bin(|b, a| if b == a { u32::MAX } else { 0 }),
                Token::Unknown(c) => self.unknown(c),
            }
        }
        (self.stack.top() & 0xFF) as u8
    }

    /// Applies a binary operator: `a` is popped, the result replaces `b`,
    /// and the slot that held `a` (now the oldest) is zeroed
    fn bin(&mut self, f: fn(u32, u32) -> u32) {
        let a = self.stack.pop();
        let b = self.stack.top();
        self.stack.set_top(f(b, a));
        self.stack.set_at(255, 0);
    }

    fn unknown(&mut self, c: char) {
        let i = (c as usize) & 0x7F;
        if !self.warned[i] {
            self.warned[i] = true;
            warn!("opcode {c:?} not implemented, ignored");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn melody(text: &str) -> Melody {
        Melody::new(text).unwrap()
    }

    /// Evaluates a melody on a fresh VM and returns the sample at `t`
    fn eval(text: &str, t: u32) -> u8 {
        let m = melody(text);
        let mut vm = Vm::new();
        vm.compute(m.tokens(), t)
    }

    /// Parses one `melody @ t ( expected )` line and checks it
    ///
    /// `t` and the expected byte are hexadecimal.
    fn parse_and_check(line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let (text, rest) = line.split_once('@').unwrap();
        let (t, rest) = rest.split_once('(').unwrap();
        let expected = rest.trim().strip_suffix(')').unwrap().trim();
        let t = u32::from_str_radix(t.trim(), 16).unwrap();
        let expected = u8::from_str_radix(expected, 16).unwrap();
        let got = eval(text.trim(), t);
        assert_eq!(
            got,
            expected,
            "program {:?} at t = {t:#x}: got {got:#04x}, expected {expected:#04x}",
            text.trim()
        );
    }

    #[test]
    fn opcodes() {
        const TEST_SUITE: &str = "
            !FF           @ 0   ( ff )
            !a            @ 2a  ( 2a )
            !a            @ 101 ( 01 )
            !apl          @ aa  ( aa )
            !FFFFFFFF1f   @ 0   ( 00 )
            !01!0e        @ 0   ( 00 )
            !10!02e       @ 0   ( 08 )
            !05!0h        @ 0   ( 00 )
            !0B!03h       @ 0   ( 02 )
            !0A!05f       @ 0   ( 0f )
            !0!01g        @ 0   ( ff )
            !03!05d       @ 0   ( 0f )
            !01!04j       @ 0   ( 10 )
            !01!20j       @ 0   ( 00 )
            !F0!04k       @ 0   ( 0f )
            !01!FFk       @ 0   ( 00 )
            !0F!3Cl       @ 0   ( 0c )
            !0F!30m       @ 0   ( 3f )
            !0F!FFn       @ 0   ( f0 )
            !0Fo          @ 0   ( f0 )
            !07pf         @ 0   ( 0e )
            !01!02r       @ 0   ( 01 )
            !01!02c       @ 0   ( 01 )
            !02!01s       @ 0   ( 00 )
            !01!02s       @ 0   ( ff )
            !02!01t       @ 0   ( ff )
            !01!02t       @ 0   ( 00 )
            !07!07u       @ 0   ( ff )
            !07!08u       @ 0   ( 00 )
            !2A!0q        @ 0   ( 2a )
            !FFq          @ 0   ( ff )
            !2A!0b        @ 0   ( 2a )
            !07!2A!01bf   @ 0   ( 54 )
            !07z          @ 0   ( 07 )
            !07i          @ 0   ( 07 )
            !F!F          @ 0   ( 0f )
            !0.7f         @ 0   ( 07 )
        ";
        for line in TEST_SUITE.lines() {
            parse_and_check(line);
        }
    }

    #[test]
    fn sample_is_low_byte_of_persistent_stack() {
        let m = melody("!a");
        let mut vm = Vm::new();
        assert_eq!(vm.compute(m.tokens(), 0), 0);
        assert_eq!(vm.stack().top(), 0);
        assert_eq!(vm.compute(m.tokens(), 0x100), 0);
        assert_eq!(vm.stack().top(), 0x100);
        // The previous sample's push is still buried below the top
        assert_eq!(vm.stack().at(1), 0);
    }

    #[test]
    fn compute_is_deterministic() {
        let m = melody("tone!a3k!a5kn!7Fl");
        let mut va = Vm::new();
        let mut vb = Vm::new();
        for t in 0..1000 {
            assert_eq!(va.compute(m.tokens(), t), vb.compute(m.tokens(), t));
        }
    }

    #[test]
    fn comparisons_are_all_ones() {
        let m = melody("!01!02s");
        let mut vm = Vm::new();
        vm.compute(m.tokens(), 0);
        assert_eq!(vm.stack().top(), u32::MAX);
    }

    #[test]
    fn add_wraps_to_zero_on_top() {
        // Scenario: 0xFFFFFFFF + 1 == 0 on the stack itself, not just in
        // the emitted byte
        let m = melody("!FFFFFFFF1f");
        let mut vm = Vm::new();
        assert_eq!(vm.compute(m.tokens(), 7), 0);
        assert_eq!(vm.stack().top(), 0);
    }

    #[test]
    fn binary_ops_zero_the_oldest_slot() {
        let m = melody("!01!02f");
        let mut vm = Vm::new();
        vm.compute(m.tokens(), 0);
        assert_eq!(vm.stack().top(), 3);
        assert_eq!(vm.stack().at(255), 0);
    }

    #[test]
    fn drop_resurfaces_buried_slot() {
        let m = melody("!01!02c");
        let mut vm = Vm::new();
        vm.compute(m.tokens(), 0);
        assert_eq!(vm.stack().top(), 1);
        // The dropped value parks at the oldest end of the ring
        assert_eq!(vm.stack().at(255), 2);
    }

    #[test]
    fn stack_reset_is_idempotent() {
        let m = melody("!a7f");
        let mut vm = Vm::new();
        vm.compute(m.tokens(), 99);
        vm.reset();
        let once = *vm.stack();
        vm.reset();
        assert_eq!(*vm.stack(), once);
        assert_eq!(*vm.stack(), Stack::default());
    }

    #[test]
    fn snapshot_matches_depth_order() {
        let m = melody("!01!02!03");
        let mut vm = Vm::new();
        vm.compute(m.tokens(), 0);
        let snap = vm.stack().snapshot();
        assert_eq!(snap.len(), 256);
        assert_eq!(snap[0], 3);
        assert_eq!(snap[1], 2);
        assert_eq!(snap[2], 1);
    }

    #[test]
    fn tokenizer_drops_nops() {
        let m = melody("!.a.");
        assert_eq!(m.tokens(), &[Token::T]);
    }

    #[test]
    fn tokenizer_splits_runs_at_eight_digits() {
        let m = melody("!FFFFFFFF1");
        assert_eq!(m.tokens(), &[Token::Push(0xFFFF_FFFF), Token::Push(1)]);
    }

    #[test]
    fn runs_never_span_lines() {
        let m = melody("!F!F");
        assert_eq!(m.tokens(), &[Token::Push(0xF), Token::Push(0xF)]);
    }

    #[test]
    fn lowercase_hex_is_not_a_digit() {
        // 'f' is ADD; only 0-9A-F extend a literal
        let m = melody("!1f2");
        assert_eq!(
            m.tokens(),
            &[Token::Push(1), Token::Add, Token::Push(2)]
        );
    }

    #[test]
    fn muting_equals_deleting_line_contents() {
        let mut m = melody("x!aa!0F");
        let deleted = melody("x!!0F");
        m.set_muted(BTreeSet::from([0]));
        assert_eq!(m.tokens(), deleted.tokens());
        m.set_muted(BTreeSet::new());
        assert_eq!(m.tokens(), melody("x!aa!0F").tokens());
    }

    #[test]
    fn serialize_round_trips() {
        for text in [
            "title!a1f!..b",
            "!FF",
            "drone",
            "!a!!b",
            "x!a8k3el",
        ] {
            let m = melody(text);
            assert_eq!(m.serialize(), text);
            assert_eq!(melody(&m.serialize()), m);
        }
    }

    #[test]
    fn serialize_strips_padding() {
        let m = melody("t!a1f..!..b...!!!");
        assert_eq!(m.serialize(), "t!a1f!..b");
    }

    #[test]
    fn leading_bang_iff_title_empty() {
        assert_eq!(melody("!FF").serialize(), "!FF");
        assert!(melody("!FF").title().is_empty());
        assert_eq!(melody("").serialize(), "!");
        assert_eq!(melody("name!FF").serialize(), "name!FF");
    }

    #[test]
    fn newlines_are_stripped_before_parsing() {
        let m = melody("t!a1\nf\n");
        assert_eq!(m.serialize(), "t!a1f");
    }

    #[test]
    fn expand_is_invisible_in_serialization() {
        let mut m = melody("t!a!b");
        m.expand();
        assert_eq!(m.lines().len(), LINE_COUNT);
        assert!(m.lines().iter().all(|l| l.len() == LINE_WIDTH));
        assert_eq!(m.serialize(), "t!a!b");
    }

    #[test]
    fn overlong_line_is_rejected() {
        let err = Melody::new("t!aaaaaaaaaaaaaaaaa").unwrap_err();
        assert_eq!(err, MelodyError::LineTooLong { index: 0, len: 17 });
        // Exactly 16 characters is fine
        assert!(Melody::new("t!aaaaaaaaaaaaaaaa").is_ok());
    }

    #[test]
    fn too_many_lines_is_rejected() {
        let text = format!("t{}", "!a".repeat(LINE_COUNT + 1));
        let err = Melody::new(&text).unwrap_err();
        assert_eq!(err, MelodyError::TooManyLines { count: 17 });
    }

    #[test]
    fn edit_char_replaces_and_retokenizes() {
        let mut m = melody("t!a");
        m.expand();
        m.edit_char(0, 1, '7').unwrap();
        assert_eq!(m.tokens(), &[Token::T, Token::Push(7)]);
        m.edit_char(0, 0, '.').unwrap();
        assert_eq!(m.tokens(), &[Token::Push(7)]);
    }

    #[test]
    fn edit_char_rejects_bad_positions() {
        let mut m = melody("t!a");
        m.expand();
        assert_eq!(
            m.edit_char(LINE_COUNT, 0, 'a'),
            Err(MelodyError::BadPosition {
                row: LINE_COUNT,
                col: 0
            })
        );
        assert_eq!(
            m.edit_char(0, LINE_WIDTH, 'a'),
            Err(MelodyError::BadPosition {
                row: 0,
                col: LINE_WIDTH
            })
        );
        assert_eq!(
            m.edit_char(0, 0, 'ä'),
            Err(MelodyError::BadCharacter('ä'))
        );
    }

    #[test]
    fn unknown_opcodes_leave_the_stack_alone() {
        let with = melody("!07vwxyz");
        let without = melody("!07");
        let mut va = Vm::new();
        let mut vb = Vm::new();
        assert_eq!(va.compute(with.tokens(), 0), vb.compute(without.tokens(), 0));
        assert_eq!(va.stack(), vb.stack());
    }

    #[test]
    fn pick_zero_behaves_as_dup() {
        let m = melody("!2A!0q");
        let mut vm = Vm::new();
        vm.compute(m.tokens(), 0);
        assert_eq!(vm.stack().top(), 0x2A);
        assert_eq!(vm.stack().at(1), 0x2A);
    }

    #[test]
    fn pick_ff_leaves_the_index() {
        assert_eq!(eval("!FFq", 0), 0xFF);
    }

    #[test]
    fn put_writes_below_then_rotates() {
        // 07 2A 01 b: writes 0x2A two slots down (over the 7), drops the
        // index, and leaves 0x2A visible on top
        let m = melody("!07!2A!01b");
        let mut vm = Vm::new();
        vm.compute(m.tokens(), 0);
        assert_eq!(vm.stack().top(), 0x2A);
        assert_eq!(vm.stack().at(1), 0x2A);
    }
}
