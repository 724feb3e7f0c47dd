//! The bytecode virtual machine.

use std::collections::HashMap;

use crate::compiler;
use crate::heap::{Heap, StringId};
use crate::prelude::{Chunk, InterpretationError, OpCode, Value};

/// Used as the capacity of the stack. A value stack deeper than this is a
/// runtime error ("Stack overflow."), not a panic — unlike popping past the
/// bottom of the stack, which is an internal invariant violation.
const STACK_MAX: usize = 65535;

/// Maintains state for the Lox virtual machine: the heap of interned strings
/// and the table of global variables. Both outlive any one [Chunk] that gets
/// run, so a `VM` can [VM::interpret] many chunks in sequence (as the REPL
/// does) while keeping previously-defined globals and strings alive.
#[derive(Default)]
pub struct VM {
    heap: Heap,
    globals: HashMap<StringId, Value>,
}

/// A VM with an active chunk and instruction pointer.
struct VmWithChunk<'a> {
    /// Instruction pointer --- index into the chunk for the next opcode to be executed
    ip: usize,
    /// Value stack -- modified as elements are pushed and popped from the stack.
    stack: Vec<Value>,
    chunk: &'a Chunk,
    heap: &'a mut Heap,
    globals: &'a mut HashMap<StringId, Value>,
}

/// Fetches the next bytecode in the chunk, **AND** increments the instruction pointer.
///
/// Note: use [current_ip] to get the "current" value of the instruction pointer being executed
/// right now.
macro_rules! next_bytecode {
    ($self: ident, $chunk: ident) => {{
        let byte = $chunk.get($self.ip);
        $self.ip += 1;
        byte
    }};
}

/// Gets the value of the current instruction pointer. To be used in conjunction with
/// [next_bytecode].
macro_rules! current_ip {
    ($self: ident) => {
        $self.ip - 1
    };
}

impl VM {
    /// Returns a fresh VM with an empty heap and no globals defined.
    pub fn new() -> Self {
        VM::default()
    }

    /// Interpret the given Lox source, writing anything `print`ed to real stdout.
    pub fn interpret(&mut self, source: &str) -> crate::Result<()> {
        self.interpret_with_output(source, &mut StdoutSink)
    }

    /// Interpret the given Lox source, writing anything `print`ed to `out`.
    ///
    /// Compiling and running against `out` instead of hardcoding stdout lets
    /// tests capture a script's output without touching the real terminal.
    pub fn interpret_with_output(
        &mut self,
        source: &str,
        out: &mut impl std::fmt::Write,
    ) -> crate::Result<()> {
        let chunk = compiler::compile(source, &mut self.heap)?;

        let mut vm = VmWithChunk {
            ip: 0,
            stack: Vec::with_capacity(STACK_MAX),
            chunk: &chunk,
            heap: &mut self.heap,
            globals: &mut self.globals,
        };
        vm.run(out)
    }
}

/// A sink that writes `print`ed output to real stdout via [std::fmt::Write].
struct StdoutSink;

impl std::fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        print!("{s}");
        Ok(())
    }
}

impl<'a> VmWithChunk<'a> {
    /// The main opcode interpreter loop.
    fn run(&mut self, out: &mut impl std::fmt::Write) -> crate::Result<()> {
        use OpCode::*;
        let chunk = self.chunk;

        loop {
            if cfg!(feature = "trace_execution") {
                use crate::debug::disassemble_instruction;

                print!("        ");
                for value in self.stack.iter() {
                    print!("[ {value:?} ]")
                }
                println!();

                disassemble_instruction(chunk, self.ip);
            }

            let opcode = next_bytecode!(self, chunk)
                .expect("I have an instruction pointer within range")
                .as_opcode();

            match opcode {
                Some(Constant) => {
                    let constant = next_bytecode!(self, chunk)
                        .expect("there should be an operand")
                        .resolve_constant()
                        .expect("there should be a constant at this index");
                    self.push(constant)?;
                }
                Some(ConstantLong) => {
                    let index = chunk.read_u32(self.ip);
                    self.ip += 4;
                    let constant = chunk
                        .constants
                        .get(index as usize)
                        .expect("there should be a constant at this index");
                    self.push(constant)?;
                }
                Some(Nil) => self.push(Value::Nil)?,
                Some(True) => self.push(true.into())?,
                Some(False) => self.push(false.into())?,
                Some(Pop) => {
                    self.pop();
                }
                Some(GetLocal) => {
                    let slot = self.read_u8_operand();
                    self.push(self.stack[slot as usize])?;
                }
                Some(GetLocalLong) => {
                    let slot = self.read_u32_operand();
                    self.push(self.stack[slot as usize])?;
                }
                Some(SetLocal) => {
                    let slot = self.read_u8_operand();
                    self.stack[slot as usize] = self.peek(0);
                }
                Some(SetLocalLong) => {
                    let slot = self.read_u32_operand();
                    self.stack[slot as usize] = self.peek(0);
                }
                Some(GetGlobal) => {
                    let index = self.read_u8_operand() as usize;
                    let id = self.read_global_name(index);
                    let value = self.lookup_global(id)?;
                    self.push(value)?;
                }
                Some(GetGlobalLong) => {
                    let index = self.read_u32_operand() as usize;
                    let id = self.read_global_name(index);
                    let value = self.lookup_global(id)?;
                    self.push(value)?;
                }
                Some(DefineGlobal) => {
                    let index = self.read_u8_operand() as usize;
                    let id = self.read_global_name(index);
                    let value = self.pop();
                    self.globals.insert(id, value);
                }
                Some(DefineGlobalLong) => {
                    let index = self.read_u32_operand() as usize;
                    let id = self.read_global_name(index);
                    let value = self.pop();
                    self.globals.insert(id, value);
                }
                Some(SetGlobal) => {
                    let index = self.read_u8_operand() as usize;
                    let id = self.read_global_name(index);
                    self.assign_global(id)?;
                }
                Some(SetGlobalLong) => {
                    let index = self.read_u32_operand() as usize;
                    let id = self.read_global_name(index);
                    self.assign_global(id)?;
                }
                Some(Equal) => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    self.push(lhs.lox_equal(&rhs).into())?;
                }
                Some(Greater) => self.numeric_binary_op(|a, b| a > b)?,
                Some(Less) => self.numeric_binary_op(|a, b| a < b)?,
                Some(Add) => self.add()?,
                Some(Subtract) => self.numeric_binary_op(|a, b| a - b)?,
                Some(Multiply) => self.numeric_binary_op(|a, b| a * b)?,
                Some(Divide) => self.numeric_binary_op(|a, b| a / b)?,
                Some(Not) => {
                    let value = self.pop();
                    self.push(value.is_falsy().into())?;
                }
                Some(Negate) => {
                    if let Some(number) = self.peek(0).as_number() {
                        self.pop();
                        self.push((-number).into())?;
                    } else {
                        return self.runtime_error("Operand must be a number.");
                    }
                }
                Some(Print) => {
                    let value = self.pop();
                    value
                        .write_display(self.heap, out)
                        .expect("writing to the print sink should not fail");
                    writeln!(out).expect("writing to the print sink should not fail");
                }
                Some(Jump) => {
                    let offset = chunk.read_u16(self.ip);
                    self.ip += 2 + offset as usize;
                }
                Some(JumpIfFalse) => {
                    let offset = chunk.read_u16(self.ip);
                    self.ip += 2;
                    if self.peek(0).is_falsy() {
                        self.ip += offset as usize;
                    }
                }
                Some(Loop) => {
                    let offset = chunk.read_u16(self.ip);
                    self.ip += 2;
                    self.ip -= offset as usize;
                }
                Some(Return) => {
                    return Ok(());
                }
                None => panic!("fetched invalid opcode at {}", current_ip!(self)),
            }
        }
    }

    /// Reads a 1-byte operand at the current `ip`, advancing past it.
    #[inline(always)]
    fn read_u8_operand(&mut self) -> u8 {
        let byte = self
            .chunk
            .get(self.ip)
            .expect("operand byte in range")
            .as_constant_index() as u8;
        self.ip += 1;
        byte
    }

    /// Reads a 4-byte little-endian operand at the current `ip`, advancing past it.
    #[inline(always)]
    fn read_u32_operand(&mut self) -> u32 {
        let value = self.chunk.read_u32(self.ip);
        self.ip += 4;
        value
    }

    /// Resolves the constant at `index` as a global variable's name.
    fn read_global_name(&self, index: usize) -> StringId {
        let value = self
            .chunk
            .constants
            .get(index)
            .expect("there should be a constant at this index");
        value
            .as_string_id()
            .expect("global variable names are always interned strings")
    }

    fn lookup_global(&mut self, id: StringId) -> crate::Result<Value> {
        match self.globals.get(&id) {
            Some(value) => Ok(*value),
            None => {
                let name = self.heap.resolve(id).to_owned();
                self.runtime_error_owned(format!("Undefined variable '{name}'."))
            }
        }
    }

    fn assign_global(&mut self, id: StringId) -> crate::Result<()> {
        if !self.globals.contains_key(&id) {
            let name = self.heap.resolve(id).to_owned();
            return self.runtime_error_owned(format!("Undefined variable '{name}'."));
        }
        self.globals.insert(id, self.peek(0));
        Ok(())
    }

    /// `+` on two numbers adds; on two strings, concatenates (interning the
    /// result); anything else is a runtime error.
    fn add(&mut self) -> crate::Result<()> {
        let rhs = self.pop();
        let lhs = self.pop();

        if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
            return self.push((a + b).into());
        }

        if let (Some(a), Some(b)) = (lhs.as_string_id(), rhs.as_string_id()) {
            let a_text = self.heap.resolve(a).to_owned();
            let b_text = self.heap.resolve(b).to_owned();
            let id = self.heap.intern_concat(&a_text, &b_text);
            return self.push(Value::from(id));
        }

        self.runtime_error("Operands must be two numbers or two strings.")
    }

    fn runtime_error<T>(&mut self, message: &str) -> crate::Result<T> {
        self.runtime_error_owned(message.to_owned())
    }

    fn runtime_error_owned<T>(&mut self, message: String) -> crate::Result<T> {
        eprintln!("{message}");

        let line = self
            .chunk
            .line_at(current_ip!(self))
            .expect("every instruction has a line number");
        eprintln!("[line {line}] in script");

        self.reset_stack();

        Err(InterpretationError::RuntimeError)
    }

    /// Pops two numeric operands on the stack to perform a binary operation.
    fn numeric_binary_op<F, T>(&mut self, op: F) -> crate::Result<()>
    where
        F: Fn(f64, f64) -> T,
        T: Into<Value>,
    {
        let rhs = self.pop();
        let lhs = self.pop();

        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => self.push(op(a, b).into()),
            _ => self.runtime_error("Operands must be numbers."),
        }
    }

    /// Pushes a [Value] on to the value stack.
    ///
    /// # Errors
    ///
    /// Returns a runtime error if the stack would grow past [STACK_MAX].
    fn push(&mut self, value: Value) -> crate::Result<()> {
        if self.stack.len() >= STACK_MAX {
            return self.runtime_error("Stack overflow.");
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops and returns the top [Value] on the value stack.
    ///
    /// # Panics
    ///
    /// Panics when the value stack is empty. Given well-formed Lox bytecode, a pop cannot occur
    /// when the value stack is empty; therefore the interpreter panics if it is in this state.
    #[inline(always)]
    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack is empty")
    }

    /// Peeks at the value relative to the top of the stack.
    ///
    /// # Panics
    ///
    ///  * When the stack is empty
    ///  * When the distance goes off the end of the stack
    #[inline(always)]
    fn peek(&self, distance: usize) -> Value {
        *self
            .stack
            .get(self.stack.len() - 1 - distance)
            .expect("peeked escaped bounds of the stack")
    }

    #[inline(always)]
    fn reset_stack(&mut self) {
        self.stack.clear()
    }
}

////////////////////////////////////////////// Tests //////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;

    fn run(source: &str) -> crate::Result<String> {
        let mut vm = VM::new();
        let mut out = String::new();
        vm.interpret_with_output(source, &mut out)?;
        Ok(out)
    }

    #[test]
    fn prints_arithmetic() {
        assert_eq!("7\n", run("print 1 + 2 * 3;").unwrap());
    }

    #[test]
    fn string_concatenation() {
        assert_eq!("helloworld\n", run("print \"hello\" + \"world\";").unwrap());
    }

    #[test]
    fn globals_persist_and_reassign() {
        assert_eq!(
            "2\n",
            run("var x = 1; x = x + 1; print x;").unwrap()
        );
    }

    #[test]
    fn reading_undefined_global_is_a_runtime_error() {
        assert!(matches!(
            run("print nope;"),
            Err(InterpretationError::RuntimeError)
        ));
    }

    #[test]
    fn assigning_to_undefined_global_is_a_runtime_error() {
        assert!(matches!(
            run("nope = 1;"),
            Err(InterpretationError::RuntimeError)
        ));
    }

    #[test]
    fn locals_shadow_across_scopes() {
        assert_eq!(
            "2\n1\n",
            run("var a = 1; { var a = 2; print a; } print a;").unwrap()
        );
    }

    #[test]
    fn if_else_picks_the_right_branch() {
        assert_eq!(
            "yes\n",
            run("if (1 < 2) print \"yes\"; else print \"no\";").unwrap()
        );
        assert_eq!(
            "no\n",
            run("if (1 > 2) print \"yes\"; else print \"no\";").unwrap()
        );
    }

    #[test]
    fn while_loop_counts_up() {
        assert_eq!(
            "0\n1\n2\n",
            run("var i = 0; while (i < 3) { print i; i = i + 1; }").unwrap()
        );
    }

    #[test]
    fn and_or_short_circuit() {
        // If short-circuiting didn't skip the right operand, looking up the
        // undefined global would turn these into runtime errors.
        assert_eq!("false\n", run("print false & undefined_name;").unwrap());
        assert_eq!("true\n", run("print true | undefined_name;").unwrap());
    }

    #[test]
    fn adding_number_and_string_is_a_runtime_error() {
        assert!(matches!(
            run("print 1 + \"two\";"),
            Err(InterpretationError::RuntimeError)
        ));
    }

    #[test]
    fn negating_a_non_number_is_a_runtime_error() {
        assert!(matches!(
            run("print -\"nope\";"),
            Err(InterpretationError::RuntimeError)
        ));
    }

    #[test]
    fn greater_equal_compiles_to_less_then_not() {
        assert_eq!("true\n", run("print 2 >= 2;").unwrap());
        assert_eq!("true\n", run("print 3 >= 2;").unwrap());
        assert_eq!("false\n", run("print 1 >= 2;").unwrap());
    }
}
