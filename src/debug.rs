//! Helpers to print a debug representations.

use crate::chunk::{Chunk, OpCode};

/// Given a chunk, prints its disassembly to `stdout`
pub fn disassemble_chunk(c: &Chunk, name: &str) {
    println!("== {name} ==");

    let mut offset = 0;
    while offset < c.len() {
        offset = disassemble_instruction(c, offset);
    }
}

/// Print one instruction from the [Chunk] to `stdout`, taking into account its operands.
pub fn disassemble_instruction(c: &Chunk, offset: usize) -> usize {
    print!("{offset:04} ");

    if offset > 0 && at_same_line_as_previous_offset(c, offset) {
        print!("   | ");
    } else {
        let line_no = c.line_at(offset).unwrap();
        print!("{line_no:4} ")
    }

    let instruction = c
        .get(offset)
        .expect("offset too large")
        .as_opcode()
        .expect("Invalid byte for opcode");

    use OpCode::*;
    match instruction {
        Constant => constant_instruction("OP_CONSTANT", c, offset),
        ConstantLong => constant_long_instruction("OP_CONSTANT_LONG", c, offset),
        Nil => simple_instruction("OP_NIL", offset),
        True => simple_instruction("OP_TRUE", offset),
        False => simple_instruction("OP_FALSE", offset),
        Pop => simple_instruction("OP_POP", offset),
        GetLocal => byte_instruction("OP_GET_LOCAL", c, offset),
        GetLocalLong => u32_instruction("OP_GET_LOCAL_LONG", c, offset),
        SetLocal => byte_instruction("OP_SET_LOCAL", c, offset),
        SetLocalLong => u32_instruction("OP_SET_LOCAL_LONG", c, offset),
        GetGlobal => constant_instruction("OP_GET_GLOBAL", c, offset),
        GetGlobalLong => constant_long_instruction("OP_GET_GLOBAL_LONG", c, offset),
        DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", c, offset),
        DefineGlobalLong => constant_long_instruction("OP_DEFINE_GLOBAL_LONG", c, offset),
        SetGlobal => constant_instruction("OP_SET_GLOBAL", c, offset),
        SetGlobalLong => constant_long_instruction("OP_SET_GLOBAL_LONG", c, offset),
        Equal => simple_instruction("OP_EQUAL", offset),
        Greater => simple_instruction("OP_GREATER", offset),
        Less => simple_instruction("OP_LESS", offset),
        Add => simple_instruction("OP_ADD", offset),
        Subtract => simple_instruction("OP_SUBTRACT", offset),
        Multiply => simple_instruction("OP_MULTIPLY", offset),
        Divide => simple_instruction("OP_DIVIDE", offset),
        Not => simple_instruction("OP_NOT", offset),
        Negate => simple_instruction("OP_NEGATE", offset),
        Print => simple_instruction("OP_PRINT", offset),
        Jump => jump_instruction("OP_JUMP", 1, c, offset),
        JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, c, offset),
        Loop => jump_instruction("OP_LOOP", -1, c, offset),
        Return => simple_instruction("OP_RETURN", offset),
    }
}

/////////////////////////////////////// Instruction printers ///////////////////////////////////////

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{name:>22}");
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk
        .get(offset + 1)
        .expect("ran out of bytes")
        .as_constant_index();
    println!("{name:>22} {slot:4}");
    offset + 2
}

fn u32_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let value = chunk.read_u32(offset + 1);
    println!("{name:>22} {value:4}");
    offset + 5
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let jump = chunk.read_u16(offset + 1) as i32;
    let target = offset as i32 + 3 + sign * jump;
    println!("{name:>22} {offset:4} -> {target}");
    offset + 3
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let (index, value) = chunk
        .get(offset + 1)
        .expect("ran out of bytes")
        .resolve_constant_with_index()
        .expect("Invalid constant index");

    println!("{name:>22} {index:4} '{value:?}'");
    offset + 2
}

fn constant_long_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let index = chunk.read_u32(offset + 1);
    let value = chunk
        .constants
        .get(index as usize)
        .expect("Invalid constant index");

    println!("{name:>22} {index:4} '{value:?}'");
    offset + 5
}

//////////////////////////////////////////// Utilities ////////////////////////////////////////////

/// Returns true if the given offset is at the same line number as the previous line number.
fn at_same_line_as_previous_offset(chunk: &Chunk, offset: usize) -> bool {
    assert!(offset > 0);

    chunk
        .line_at(offset)
        .zip(chunk.line_at(offset - 1))
        .map(|(current_line, previous_line)| current_line == previous_line)
        .unwrap()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::value::Value;

    #[test]
    fn disassembling_a_short_chunk_does_not_panic() {
        let mut c = Chunk::new();
        c.write_constant(Value::Number(1.0), 1);
        c.write_opcode(OpCode::Return, 1);
        disassemble_chunk(&c, "test chunk");
    }

    #[test]
    fn disassembling_jumps_does_not_panic() {
        let mut c = Chunk::new();
        let jump = c.emit_jump(OpCode::JumpIfFalse, 1);
        c.write_opcode(OpCode::Nil, 1);
        c.patch_jump(jump).unwrap();
        c.write_opcode(OpCode::Return, 1);
        disassemble_chunk(&c, "jump chunk");
    }
}
