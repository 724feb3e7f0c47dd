//! Contains a [Chunk] of [OpCode]s, its constant pool, and its run-length line map.

use crate::value::{Value, ValueArray};
use crate::with_try_from_u8;

with_try_from_u8! {
    /// A one-byte operation code for Lox.
    ///
    /// (See Crafting Interpreters, p. 244, generalized here with local/global long
    /// forms and control-flow jumps.)
    #[repr(u8)]
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub enum OpCode {
        Constant,
        ConstantLong,
        Nil,
        True,
        False,
        Pop,
        GetLocal,
        GetLocalLong,
        SetLocal,
        SetLocalLong,
        GetGlobal,
        GetGlobalLong,
        DefineGlobal,
        DefineGlobalLong,
        SetGlobal,
        SetGlobalLong,
        Equal,
        Greater,
        Less,
        Add,
        Subtract,
        Multiply,
        Divide,
        Not,
        Negate,
        Print,
        Jump,
        JumpIfFalse,
        Loop,
        Return,
    }
}

/// Largest index directly representable by a 1-byte operand.
const U8_MAX_INDEX: usize = u8::MAX as usize;

/// A chunk of bytecode, with its constant pool and line map.
///
/// (See Crafting Interpreters, p. 244.)
#[derive(Default)]
pub struct Chunk {
    code: Vec<u8>,
    pub constants: ValueArray,
    lines: Vec<LineNumberRun>,
}

/// A valid byte from a chunk. This byte can then be interpreted as required.
#[derive(Clone, Copy)]
pub struct BytecodeEntry<'a> {
    byte: u8,
    provenance: &'a Chunk,
}

/// An [OpCode] that has already been written to the bytestream.
///
/// This opcode can be augmented with an additional operand.
pub struct WrittenOpcode<'a> {
    line: usize,
    provenance: &'a mut Chunk,
}

/// An entry of run-length encoded line numbers.
/// Every entry signifies that the next `length` bytes have the same line number.
#[derive(Debug, Clone)]
struct LineNumberRun {
    /// The actual line number
    line_number: usize,
    /// How many consecutive bytes share this line number.
    length: usize,
}

///////////////////////////////////////// Implementation //////////////////////////////////////////

impl Chunk {
    /// Return a new, empty [Chunk].
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Get an entry from the bytecode stream.
    ///
    /// Returns `Some(entry)` when the offset is in `[0, self.len())`.
    pub fn get(&self, offset: usize) -> Option<BytecodeEntry> {
        self.code.get(offset).copied().map(|byte| BytecodeEntry {
            byte,
            provenance: self,
        })
    }

    /// Reads a 4-byte little-endian operand starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if fewer than 4 bytes remain from `offset`; a well-formed chunk
    /// never triggers this, since every `*_LONG` opcode is always followed by
    /// exactly 4 operand bytes.
    pub fn read_u32(&self, offset: usize) -> u32 {
        let bytes: [u8; 4] = self.code[offset..offset + 4]
            .try_into()
            .expect("chunk truncated mid-operand");
        u32::from_le_bytes(bytes)
    }

    /// Reads a 2-byte big-endian jump offset starting at `offset`.
    pub fn read_u16(&self, offset: usize) -> u16 {
        let bytes: [u8; 2] = self.code[offset..offset + 2]
            .try_into()
            .expect("chunk truncated mid-operand");
        u16::from_be_bytes(bytes)
    }

    /// Append a single [OpCode] to the chunk.
    pub fn write_opcode(&mut self, opcode: OpCode, line: usize) -> WrittenOpcode {
        self.write(opcode as u8, line);

        WrittenOpcode {
            line,
            provenance: self,
        }
    }

    /// Appends the value to the constant pool, and returns its index.
    ///
    /// Indices span `[0, u32::MAX]`; see [Chunk::write_constant] for the
    /// encoding used to reference them from bytecode.
    pub fn add_constant(&mut self, value: Value) -> u32 {
        let index = self.constants.write(value);
        u32::try_from(index).expect("constant pool exceeded u32::MAX entries")
    }

    /// Adds `value` to the constant pool and emits either `CONSTANT` with a
    /// 1-byte index, or `CONSTANT_LONG` with a 4-byte little-endian index,
    /// depending on the resulting index's magnitude. Returns the stored index.
    pub fn write_constant(&mut self, value: Value, line: usize) -> u32 {
        let index = self.add_constant(value);
        if index as usize <= U8_MAX_INDEX {
            self.write_opcode(OpCode::Constant, line)
                .with_operand(index as u8);
        } else {
            self.write_opcode(OpCode::ConstantLong, line)
                .with_u32_operand(index);
        }
        index
    }

    /// Returns the source line for whatever is at the given code offset.
    pub fn line_at(&self, offset: usize) -> Option<usize> {
        let mut base_offset = 0;
        for run in self.lines.iter() {
            if (base_offset..base_offset + run.length).contains(&offset) {
                return Some(run.line_number);
            }

            base_offset += run.length;
        }

        None
    }

    /// Returns the length of the byte stream.
    #[inline]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if nothing has been appended to the byte stream.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Emits a placeholder 2-byte forward jump for `opcode` (`JUMP` or
    /// `JUMP_IF_FALSE`), returning the offset of its first operand byte so it
    /// can later be fixed up with [Chunk::patch_jump].
    pub fn emit_jump(&mut self, opcode: OpCode, line: usize) -> usize {
        self.write(opcode as u8, line);
        self.write(0xff, line);
        self.write(0xff, line);
        self.len() - 2
    }

    /// Backpatches the 2-byte jump operand at `offset` so that it lands just
    /// past the most recently emitted byte.
    ///
    /// # Errors
    ///
    /// Returns an error message if the jump distance does not fit in 16 bits.
    pub fn patch_jump(&mut self, offset: usize) -> Result<(), &'static str> {
        let jump = self.len() - offset - 2;
        let jump = u16::try_from(jump).map_err(|_| "Too much code to jump over.")?;
        let bytes = jump.to_be_bytes();
        self.code[offset] = bytes[0];
        self.code[offset + 1] = bytes[1];
        Ok(())
    }

    /// Emits `LOOP` with a backward 2-byte big-endian offset to `loop_start`.
    ///
    /// # Errors
    ///
    /// Returns an error message if the loop body is too large to represent in
    /// 16 bits ("Loop body too large.").
    pub fn emit_loop(&mut self, loop_start: usize, line: usize) -> Result<(), &'static str> {
        self.write(OpCode::Loop as u8, line);

        let offset = self.len() + 2 - loop_start;
        let offset = u16::try_from(offset).map_err(|_| "Loop body too large.")?;
        let bytes = offset.to_be_bytes();
        self.write(bytes[0], line);
        self.write(bytes[1], line);
        Ok(())
    }

    /// Actually writes to the byte stream.
    fn write(&mut self, payload: u8, line_number: usize) {
        self.code.push(payload);

        // Figure out the line number
        if let Some(run) = self.previous_line_number_run() {
            if run.line_number == line_number {
                run.increment()
            } else {
                // Must create new run
                self.lines.push(LineNumberRun::new(line_number))
            }
        } else {
            assert!(self.lines.is_empty());
            self.lines.push(LineNumberRun::new(line_number))
        }
    }

    /// Return the last line number run
    #[inline(always)]
    fn previous_line_number_run(&mut self) -> Option<&mut LineNumberRun> {
        self.lines.iter_mut().rev().next()
    }
}

impl LineNumberRun {
    fn new(line_number: usize) -> Self {
        Self {
            line_number,
            length: 1,
        }
    }

    fn increment(&mut self) {
        self.length += 1;
    }
}

impl<'a> BytecodeEntry<'a> {
    /// Returns the byte as an index into the constant pool.
    #[inline(always)]
    pub fn as_constant_index(self) -> usize {
        self.byte as usize
    }

    /// Returns the byte decoded as an [OpCode].
    /// Returns `None` if the byte is not a valid opcode.
    #[inline]
    pub fn as_opcode(self) -> Option<OpCode> {
        self.byte.try_into().ok()
    }

    /// Yanks out a constant from the constant pool, treating this byte as a
    /// 1-byte constant index.
    #[inline]
    pub fn resolve_constant(self) -> Option<Value> {
        self.provenance.constants.get(self.as_constant_index())
    }

    /// Same as [BytecodeEntry::resolve_constant], but returns `(index, value)`.
    #[inline]
    pub fn resolve_constant_with_index(self) -> Option<(usize, Value)> {
        self.resolve_constant()
            .map(|value| (self.as_constant_index(), value))
    }
}

impl<'a> WrittenOpcode<'a> {
    /// Consumes `self` and appends a 1-byte operand for the last written instruction.
    #[inline]
    pub fn with_operand(self, index: u8) {
        self.provenance.write(index, self.line);
    }

    /// Consumes `self` and appends a 4-byte little-endian operand for the last
    /// written instruction (used by the `*_LONG` opcodes).
    #[inline]
    pub fn with_u32_operand(self, index: u32) {
        for byte in index.to_le_bytes() {
            self.provenance.write(byte, self.line);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn boring_test_of_chunk() {
        let c = Chunk::default();
        assert_eq!(0, c.code.len());
    }

    #[test]
    fn mess_around_with_bytecode() {
        let mut c = Chunk::new();
        let i = c.add_constant(1.0.into());
        c.write_opcode(OpCode::Constant, 123)
            .with_operand(i as u8);
        c.write_opcode(OpCode::Return, 123);

        assert!(c.len() >= 3);

        // Constant
        assert_eq!(Some(OpCode::Constant), c.get(0).unwrap().as_opcode());
        assert_eq!(Some(0), c.get(1).map(|b| b.as_constant_index()));
        assert_eq!(
            Some(1.0.into()),
            c.get(1).and_then(|b| b.resolve_constant())
        );

        // Return
        assert_eq!(Some(OpCode::Return), c.get(2).unwrap().as_opcode());
    }

    #[test]
    fn line_numbers() {
        let mut c = Chunk::new();

        let idx = c.add_constant(1.2.into());

        // Write a bunch of opcodes on the same line.
        c.write_opcode(OpCode::Constant, 1).with_operand(idx as u8);
        c.write_opcode(OpCode::Constant, 1).with_operand(idx as u8);
        c.write_opcode(OpCode::Constant, 1).with_operand(idx as u8);
        assert_eq!(6, c.len());

        // Write a bunch of opcodes on a different line.
        c.write_opcode(OpCode::Constant, 2).with_operand(idx as u8);
        c.write_opcode(OpCode::Constant, 2).with_operand(idx as u8);
        c.write_opcode(OpCode::Constant, 2).with_operand(idx as u8);
        c.write_opcode(OpCode::Constant, 2).with_operand(idx as u8);
        assert_eq!(14, c.len());

        // Write an opcode on yet a different line
        c.write_opcode(OpCode::Return, 4);
        assert_eq!(15, c.len());

        // Check line numbers.
        assert_eq!(Some(1), c.line_at(2));
        assert_eq!(Some(2), c.line_at(10));
        assert_eq!(Some(4), c.line_at(c.len() - 1));
    }

    #[test]
    fn write_constant_picks_short_form_under_256() {
        let mut c = Chunk::new();
        let idx = c.write_constant(Value::Number(1.0), 1);
        assert_eq!(0, idx);
        assert_eq!(Some(OpCode::Constant), c.get(0).unwrap().as_opcode());
        assert_eq!(2, c.len());
    }

    #[test]
    fn write_constant_picks_long_form_at_256_and_above() {
        let mut c = Chunk::new();
        for i in 0..256 {
            c.add_constant(Value::Number(i as f64));
        }
        let idx = c.write_constant(Value::Number(256.0), 1);
        assert_eq!(256, idx);
        assert_eq!(Some(OpCode::ConstantLong), c.get(0).unwrap().as_opcode());
        assert_eq!(256, c.read_u32(1));
    }

    #[test]
    fn jump_patching_lands_past_patch_site() {
        let mut c = Chunk::new();
        let jump = c.emit_jump(OpCode::Jump, 1);
        c.write_opcode(OpCode::Nil, 1);
        c.patch_jump(jump).unwrap();
        assert_eq!(1, c.read_u16(jump));
    }

    #[test]
    fn loop_offset_lands_back_at_loop_start() {
        let mut c = Chunk::new();
        let loop_start = c.len();
        c.write_opcode(OpCode::Nil, 1);
        c.emit_loop(loop_start, 1).unwrap();
        let loop_operand_offset = c.len() - 2;
        assert_eq!(
            c.len() - loop_start,
            c.read_u16(loop_operand_offset) as usize
        );
    }
}
