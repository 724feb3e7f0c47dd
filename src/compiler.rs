//! Contains the Lox parser and bytecode compiler.
//!
//! This is a single-pass compiler: there is no intermediate AST. Each parsed
//! construct emits bytecode directly into the [Chunk] under construction.
use crate::chunk::WrittenOpcode;
use crate::heap::Heap;
use crate::prelude::*;

/////////////////////////////////////////// Public API ////////////////////////////////////////////

/// Compiles the given Lox source code and, if successful, returns one bytecode [Chunk].
///
/// String literals and identifier names intern into `heap`, which must be the
/// same [Heap] the [crate::vm::VM] that will run the chunk reads from.
pub fn compile(source: &str, heap: &mut Heap) -> crate::Result<Chunk> {
    let parser = Parser::new(source);
    let compiler = Compiler::new(parser, heap);
    compiler.compile()
}

///////////////////////////////////// Implementation details //////////////////////////////////////

const U8_COUNT: usize = u8::MAX as usize + 1;
const U8_MAX_INDEX: u32 = u8::MAX as u32;

/// Contains the compiler state: the [Parser], the chunk being produced, and the
/// stack of currently-visible local variables.
struct Compiler<'a, 'h> {
    parser: Parser<'a>,
    compiling_chunk: Chunk,
    locals: Vec<Local<'a>>,
    scope_depth: isize,
    heap: &'h mut Heap,
}

#[derive(Clone)]
struct Local<'a> {
    name: Lexeme<'a>,
    depth: Option<isize>,
    /// Checked on reassignment, but no grammar production ever sets this to
    /// `true` yet — dormant, reserved for a future `final`/`const` local
    /// declaration.
    is_final: bool,
}

/// Contains the parser state, including error-recovery bookkeeping.
#[derive(Debug)]
struct Parser<'a> {
    scanner: Scanner<'a>,
    current: Lexeme<'a>,
    previous: Lexeme<'a>,
    had_error: bool,
    panic_mode: bool,
}

/// A rule in the Pratt parser table. See [Compiler::parse_precedence()] for usage.
#[derive(Copy, Clone)]
struct ParserRule {
    prefix: Option<ParserFn>,
    infix: Option<ParserFn>,
    precedence: Precedence,
}

/// Any possible action taken from the parsing table. Actions take the entire compiler state, and
/// convert it, usually emitting bytecode. The `bool` is `can_assign`.
type ParserFn = fn(&mut Compiler, bool) -> ();

/// Precedence rules for [Token]s in Lox.
///
/// Precedence rules have a well-defined partial ordering ([PartialOrd]), which is required for use
/// in the Pratt parsing algorithm.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq)]
enum Precedence {
    None,
    /// `=`
    Assignment,
    /// `|`
    Or,
    /// `&`
    And,
    /// `==`
    Equality,
    /// `<` `>` `<=` `>=`
    Comparison,
    /// `+` `-`
    Term,
    /// `*` `/`
    Factor,
    /// `!` `-`
    Unary,
    /// `.` `()`
    Call,
    /// Literals, and groupings
    Primary,
}

///////////////////////////////////////// Implementations /////////////////////////////////////////

impl Precedence {
    /// Returns the next higher level of precedence.
    ///
    /// # Panics
    ///
    /// Panics if trying to obtain a higher-level of precedence than the maximum,
    /// [Precedence::Primary], which is the precedence of literals and l-values.
    #[inline]
    fn higher_precedence(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => panic!("Tried to get higher precedence than primary"),
        }
    }
}

impl ParserRule {
    /// Returns one level of precedence higher than the rule's precedence.
    /// See [Precedence::higher_precedence()].
    #[inline(always)]
    fn higher_precedence(&self) -> Precedence {
        self.precedence.higher_precedence()
    }
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source code.
    fn new(source: &'a str) -> Parser<'a> {
        let mut scanner = Scanner::new(source);
        let first_token = scanner.scan_token();
        let sentinel = scanner.make_sentinel("<before first token>");

        Parser {
            scanner,
            previous: sentinel,
            current: first_token,
            had_error: false,
            panic_mode: false,
        }
    }

    /// Update self.previous and self.current such that they move one token further in the token
    /// stream.
    fn advance(&mut self) {
        self.previous = self.current.clone();

        loop {
            self.current = self.scanner.scan_token();
            if self.current.token() != Token::Error {
                break;
            }

            self.error_at_current(self.current.text())
        }
    }

    /// Scan the next token. If the token is not of the desired type, an error message is printed.
    fn consume(&mut self, desired_token: Token, message: &'static str) {
        if self.current.token() == desired_token {
            return self.advance();
        }

        self.error_at_current(message);
    }

    /// Return true if the current token is equal to the given token.
    fn check(&self, token: Token) -> bool {
        self.current.token() == token
    }

    /// Scan the next token. Advances if the token matches `desired_token`. Returns whether
    /// `desired_token` was matched.
    fn match_and_advance(&mut self, desired_token: Token) -> bool {
        if self.check(desired_token) {
            self.advance();
            return true;
        }
        false
    }

    /// Emit a compiler error, located at the previous [Lexeme].
    fn error(&mut self, message: &str) {
        self.error_at(self.previous.clone(), message)
    }

    /// Emit a compiler error, located at the current [Lexeme].
    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current.clone(), message)
    }

    /// Emit a compiler error, located at the given [Lexeme].
    ///
    /// While `panic_mode` is set, subsequent errors are swallowed, so that one
    /// mistake doesn't cascade into a deluge of spurious syntax errors.
    fn error_at(&mut self, lexeme: Lexeme<'a>, message: &str) {
        if self.panic_mode {
            return;
        }

        self.panic_mode = true;
        self.had_error = true;

        eprint!("[line {}] Error", lexeme.line());
        if lexeme.token() == Token::Eof {
            eprint!(" at end");
        } else if lexeme.token() == Token::Error {
            // Nothing: the lexeme's text already *is* the diagnostic message.
        } else {
            eprint!(" at '{}'", lexeme.text());
        }
        eprintln!(": {message}");
    }

    /// Synchronize after being in panic mode: discard tokens until just past a
    /// `;`, or right before the start of `var`, `if`, `while`, or `print`.
    fn synchronize(&mut self) {
        self.panic_mode = false;

        while self.current.token() != Token::Eof {
            if self.previous.token() == Token::Semicolon {
                return;
            }

            match self.current.token() {
                Token::Var | Token::If | Token::While | Token::Print => return,
                _ => self.advance(),
            }
        }
    }
}

impl<'a, 'h> Compiler<'a, 'h> {
    /// Creates a new compiler with the given [Parser].
    fn new(parser: Parser<'a>, heap: &'h mut Heap) -> Compiler<'a, 'h> {
        Compiler {
            parser,
            compiling_chunk: Chunk::default(),
            locals: Vec::with_capacity(U8_COUNT),
            scope_depth: 0,
            heap,
        }
    }

    /// Takes ownership of the compiler, and returns the chunk.
    fn compile(mut self) -> crate::Result<Chunk> {
        while !self.match_and_advance(Token::Eof) {
            self.declaration();
        }
        self.end_compiler();

        if self.parser.had_error {
            return Err(InterpretationError::CompileError);
        }

        Ok(self.compiling_chunk)
    }

    /// Signal the end of compilation.
    fn end_compiler(&mut self) {
        self.emit_return();

        if cfg!(feature = "print_code") && !self.parser.had_error {
            crate::debug::disassemble_chunk(self.current_chunk(), "code");
        }
    }

    /// Create a new block scope. Make sure to decrement it later.
    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Pop one scope from the block, popping every local declared inside it off
    /// both the compiler's bookkeeping and the runtime stack.
    fn end_scope(&mut self) {
        assert!(self.scope_depth > 0);
        self.scope_depth -= 1;

        while self.has_locals_beyond_current_scope() {
            self.locals.pop();
            self.emit_instruction(OpCode::Pop);
        }
    }

    /// Returns true if there is a local variable at a scope that is no longer accessible.
    fn has_locals_beyond_current_scope(&self) -> bool {
        self.locals
            .last()
            .and_then(|local| local.depth)
            .map(|depth| depth > self.scope_depth)
            .unwrap_or(false)
    }

    /// The core of the Pratt parsing algorithm.
    ///
    /// See: <https://en.wikipedia.org/wiki/Operator-precedence_parser#Pratt_parsing>
    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();

        let can_assign = precedence <= Precedence::Assignment;

        if let Some(prefix_rule) = self.rule_from_previous().prefix {
            prefix_rule(self, can_assign);
        } else {
            self.parser
                .error("Could not figure out how to understand symbol in this context");
            return;
        }

        while precedence <= self.rule_from_current().precedence {
            self.advance();
            let infix_rule = self
                .rule_from_previous()
                .infix
                .expect("a rule with a defined precedence must always have an infix rule");

            infix_rule(self, can_assign);
        }

        if can_assign && self.match_and_advance(Token::Equal) {
            self.parser.error("Invalid assignment target.");
        }
    }

    /// Interns the identifier's text, and adds it to the current chunk's constants table.
    fn identifier_constant(&mut self, lexeme: Lexeme) -> u32 {
        let id = self.heap.intern(lexeme.text());
        self.current_chunk().add_constant(Value::from(id))
    }

    /// Finds the slot for a local, or returns `None` if it's not a local (either
    /// a global or a mistake).
    fn resolve_local(&mut self, name: &Lexeme) -> Option<u8> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name.text() == name.text() {
                if local.depth.is_none() {
                    self.parser
                        .error("Can't read local variable in its own initializer.");
                }
                return u8::try_from(i).ok();
            }
        }
        None
    }

    /// Indicate that we need a slot for another local variable.
    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }

        let name = self.parser.previous.clone();

        for local in self.locals.iter().rev() {
            if let Some(depth) = local.depth {
                if depth < self.scope_depth {
                    // It's okay to shadow a variable from an outer scope.
                    break;
                }
            }

            if name.text() == local.name.text() {
                self.parser
                    .error("Already variable with this name in this scope");
            }
        }

        self.add_local(name);
    }

    fn add_local(&mut self, name: Lexeme<'a>) {
        if self.locals.len() >= U8_COUNT {
            self.parser.error("Too many local variables in one scope.");
            return;
        }

        assert_eq!(Token::Identifier, name.token());
        self.locals.push(Local {
            name,
            depth: None,
            is_final: false,
        });
    }

    /// Consume the next identifier and interpret it as a variable.
    /// Returns the constant index for a global variable (unused for locals).
    fn parse_variable(&mut self, error_message: &'static str) -> u32 {
        self.parser.consume(Token::Identifier, error_message);

        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }

        self.identifier_constant(self.parser.previous.clone())
    }

    /// Mark the last local as being initialized — it's now safe to read.
    fn mark_initialized(&mut self) {
        self.locals.last_mut().unwrap().depth = Some(self.scope_depth);
    }

    /// Define a new variable: either mark the local initialized, or emit
    /// `DEFINE_GLOBAL`/`DEFINE_GLOBAL_LONG` depending on the constant's index.
    fn define_variable(&mut self, global: u32) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }

        if global <= U8_MAX_INDEX {
            self.emit_instruction(OpCode::DefineGlobal)
                .with_operand(global as u8);
        } else {
            self.emit_instruction(OpCode::DefineGlobalLong)
                .with_u32_operand(global);
        }
    }

    /// Parse a variable reference or assignment, depending on `can_assign` and
    /// the syntactic context.
    fn named_variable(&mut self, name: Lexeme<'a>, can_assign: bool) {
        let is_local = self.resolve_local(&name);

        if can_assign && self.parser.match_and_advance(Token::Equal) {
            self.expression();
            match is_local {
                Some(slot) => {
                    if self.locals[slot as usize].is_final {
                        self.parser.error("Can't reassign final variable.");
                    }
                    self.emit_instruction(OpCode::SetLocal).with_operand(slot);
                }
                None => {
                    let global = self.identifier_constant(name);
                    if global <= U8_MAX_INDEX {
                        self.emit_instruction(OpCode::SetGlobal)
                            .with_operand(global as u8);
                    } else {
                        self.emit_instruction(OpCode::SetGlobalLong)
                            .with_u32_operand(global);
                    }
                }
            }
        } else {
            match is_local {
                Some(slot) => {
                    self.emit_instruction(OpCode::GetLocal).with_operand(slot);
                }
                None => {
                    let global = self.identifier_constant(name);
                    if global <= U8_MAX_INDEX {
                        self.emit_instruction(OpCode::GetGlobal)
                            .with_operand(global as u8);
                    } else {
                        self.emit_instruction(OpCode::GetGlobalLong)
                            .with_u32_operand(global);
                    }
                }
            }
        }
    }

    /// Parse a declaration.
    fn declaration(&mut self) {
        if self.match_and_advance(Token::Var) {
            self.var_statement();
        } else {
            self.statement();
        }

        if self.parser.panic_mode {
            self.parser.synchronize();
        }
    }

    /// Parse a statement.
    fn statement(&mut self) {
        if self.match_and_advance(Token::Print) {
            self.print_statement();
        } else if self.match_and_advance(Token::If) {
            self.if_statement();
        } else if self.match_and_advance(Token::While) {
            self.while_statement();
        } else if self.match_and_advance(Token::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    /// Parse an expression.
    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    /// Parse a block. Assumes a new scope has already been created for this block.
    fn block(&mut self) {
        while !self.parser.check(Token::RightBrace) && !self.parser.check(Token::Eof) {
            self.declaration();
        }

        self.parser
            .consume(Token::RightBrace, "Expect '}' to end block.");
    }

    /// Parse a variable declaration. Assumes `var` has already been consumed.
    fn var_statement(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.match_and_advance(Token::Equal) {
            self.expression();
        } else {
            self.emit_instruction(OpCode::Nil);
        }

        self.parser
            .consume(Token::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    /// Parse an expression statement.
    fn expression_statement(&mut self) {
        self.expression();
        self.parser
            .consume(Token::Semicolon, "Expect ';' after expression.");
        self.emit_instruction(OpCode::Pop);
    }

    /// Parse a print statement. Assumes `print` has already been consumed.
    fn print_statement(&mut self) {
        self.expression();
        self.parser
            .consume(Token::Semicolon, "Expect ';' after value.");
        self.emit_instruction(OpCode::Print);
    }

    /// Parse an `if` statement. Assumes `if` has already been consumed.
    fn if_statement(&mut self) {
        self.parser
            .consume(Token::LeftParen, "Expect '(' after 'if'.");
        self.expression();
        self.parser
            .consume(Token::RightParen, "Expect ')' after condition.");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_instruction(OpCode::Pop);
        self.statement();

        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_instruction(OpCode::Pop);

        if self.match_and_advance(Token::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    /// Parse a `while` statement. Assumes `while` has already been consumed.
    fn while_statement(&mut self) {
        let loop_start = self.current_chunk().len();
        self.parser
            .consume(Token::LeftParen, "Expect '(' after 'while'.");
        self.expression();
        self.parser
            .consume(Token::RightParen, "Expect ')' after condition.");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_instruction(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_instruction(OpCode::Pop);
    }

    /// Appends [OpCode::Return] to current [Chunk].
    fn emit_return(&mut self) {
        self.emit_instruction(OpCode::Return);
    }

    /// Appends [OpCode::Constant]/[OpCode::ConstantLong] to current [Chunk].
    fn emit_constant(&mut self, value: Value) {
        let line = self.line_number_of_prefix();
        self.current_chunk().write_constant(value, line);
    }

    /// Writes an [OpCode] to the current [Chunk].
    /// Returns a [WrittenOpcode], with which you can write an operand.
    fn emit_instruction(&mut self, opcode: OpCode) -> WrittenOpcode {
        let line = self.line_number_of_prefix();
        self.current_chunk().write_opcode(opcode, line)
    }

    /// Writes two [OpCode]s to the current [Chunk].
    fn emit_instructions(&mut self, op1: OpCode, op2: OpCode) {
        let line = self.line_number_of_prefix();
        self.current_chunk().write_opcode(op1, line);
        self.current_chunk().write_opcode(op2, line);
    }

    /// Emits a placeholder jump, returning the offset to pass to
    /// [Compiler::patch_jump].
    fn emit_jump(&mut self, opcode: OpCode) -> usize {
        let line = self.line_number_of_prefix();
        self.current_chunk().emit_jump(opcode, line)
    }

    /// Patches a jump emitted by [Compiler::emit_jump] to land here.
    fn patch_jump(&mut self, offset: usize) {
        if let Err(message) = self.current_chunk().patch_jump(offset) {
            self.parser.error(message);
        }
    }

    /// Emits `LOOP` back to `loop_start`, reporting a compile error if the loop
    /// body is too large to jump over.
    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.line_number_of_prefix();
        if let Err(message) = self.current_chunk().emit_loop(loop_start, line) {
            self.parser.error(message);
        }
    }

    ///////////////////////////////////////// Aliases /////////////////////////////////////////////

    /// Returns the current [Chunk].
    #[inline(always)]
    fn current_chunk(&mut self) -> &mut Chunk {
        &mut self.compiling_chunk
    }

    /// Advance one token in scanner.
    #[inline(always)]
    fn advance(&mut self) {
        self.parser.advance()
    }

    /// Returns the line number of the prefix token, a.k.a. `self.parser.previous`.
    #[inline(always)]
    fn line_number_of_prefix(&self) -> usize {
        self.parser.previous.line()
    }

    /// Delegates to [Parser::match_and_advance]. Returns true if the token was matched.
    #[inline(always)]
    fn match_and_advance(&mut self, desired_token: Token) -> bool {
        self.parser.match_and_advance(desired_token)
    }

    /// Returns the parser rule for the token just consumed.
    #[inline(always)]
    fn rule_from_previous(&self) -> ParserRule {
        get_rule(self.previous_token())
    }

    /// Returns the parser rule for the token about to be consumed.
    #[inline(always)]
    fn rule_from_current(&self) -> ParserRule {
        get_rule(self.parser.current.token())
    }

    /// Return the token (type) of the previous value. Useful in prefix parser functions.
    #[inline(always)]
    fn previous_token(&self) -> Token {
        self.parser.previous.token()
    }
}

////////////////////////////////////////// Parser rules ///////////////////////////////////////////

/// Makes defining [ParserRule]s a bit cleaner looking.
macro_rules! rule {
    ($prefix:expr, $infix:expr, $precedence:expr) => {
        ParserRule {
            prefix: $prefix,
            infix: $infix,
            precedence: $precedence,
        }
    };
}

#[rustfmt::skip]
fn get_rule(token: Token) -> ParserRule {
    use Token::*;
    match token {
        //                     Prefix          Infix         Precedence
        LeftParen     => rule!{ Some(grouping), None,         Precedence::None },
        RightParen    => rule!{ None,           None,         Precedence::None },
        LeftBrace     => rule!{ None,           None,         Precedence::None },
        RightBrace    => rule!{ None,           None,         Precedence::None },
        // Reserved, but there is no array-literal or indexing grammar yet.
        LeftBracket   => rule!{ None,           None,         Precedence::None },
        RightBracket  => rule!{ None,           None,         Precedence::None },
        Dot           => rule!{ None,           None,         Precedence::None },
        Minus         => rule!{ Some(unary),    Some(binary), Precedence::Term },
        Plus          => rule!{ None,           Some(binary), Precedence::Term },
        Semicolon     => rule!{ None,           None,         Precedence::None },
        Slash         => rule!{ None,           Some(binary), Precedence::Factor },
        Star          => rule!{ None,           Some(binary), Precedence::Factor },
        Bang          => rule!{ Some(unary),    None,         Precedence::None },
        Equal         => rule!{ None,           None,         Precedence::None },
        EqualEqual    => rule!{ None,           Some(binary), Precedence::Equality },
        Greater       => rule!{ None,           Some(binary), Precedence::Comparison },
        GreaterEqual  => rule!{ None,           Some(binary), Precedence::Comparison },
        Less          => rule!{ None,           Some(binary), Precedence::Comparison },
        LessEqual     => rule!{ None,           Some(binary), Precedence::Comparison },
        And           => rule!{ None,           Some(and_),   Precedence::And },
        Or            => rule!{ None,           Some(or_),    Precedence::Or },
        Identifier    => rule!{ Some(variable), None,         Precedence::None },
        StrLiteral    => rule!{ Some(string),   None,         Precedence::None },
        Number        => rule!{ Some(number),   None,         Precedence::None },
        If            => rule!{ None,           None,         Precedence::None },
        Else          => rule!{ None,           None,         Precedence::None },
        False         => rule!{ Some(literal),  None,         Precedence::None },
        // Reserved, but there is no `for` grammar yet.
        For           => rule!{ None,           None,         Precedence::None },
        Null          => rule!{ Some(literal),  None,         Precedence::None },
        Print         => rule!{ None,           None,         Precedence::None },
        True          => rule!{ Some(literal),  None,         Precedence::None },
        Var           => rule!{ None,           None,         Precedence::None },
        While         => rule!{ None,           None,         Precedence::None },
        Error         => rule!{ None,           None,         Precedence::None },
        Eof           => rule!{ None,           None,         Precedence::None },
    }
}

/// Parse '(' as a prefix. Assumes '(' has been consumed.
fn grouping(compiler: &mut Compiler, _can_assign: bool) {
    debug_assert_eq!(Token::LeftParen, compiler.previous_token());
    compiler.expression();
    compiler
        .parser
        .consume(Token::RightParen, "Expect ')' after expression.");
}

/// Parse a number literal as a prefix. Assumes the number has been consumed.
fn number(compiler: &mut Compiler, _can_assign: bool) {
    debug_assert_eq!(Token::Number, compiler.previous_token());
    let text = compiler.parser.previous.text();
    let value = text
        .trim_end_matches('f')
        .parse::<f64>()
        .expect("Internal error: Token::Number MUST parse as a float, but didn't?");
    compiler.emit_constant(value.into());
}

/// Parse a unary operator as a prefix. Assumes the operator has been consumed.
fn unary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous_token();

    compiler.parse_precedence(Precedence::Unary);

    match operator {
        Token::Bang => compiler.emit_instruction(OpCode::Not),
        Token::Minus => compiler.emit_instruction(OpCode::Negate),
        _ => unreachable!(),
    };
}

/// Parse a binary operator as an infix. Assumes the operator has been consumed.
///
/// `>=` compiles as `LESS` then `NOT`, and `<=` as `GREATER` then `NOT` — this
/// preserves the NaN-handling quirk rather than "fixing" it.
fn binary(compiler: &mut Compiler, _can_assign: bool) {
    let operator = compiler.previous_token();
    let rule = get_rule(operator);

    compiler.parse_precedence(rule.higher_precedence());
    match operator {
        Token::EqualEqual => {
            compiler.emit_instruction(OpCode::Equal);
        }
        Token::Greater => {
            compiler.emit_instruction(OpCode::Greater);
        }
        Token::GreaterEqual => compiler.emit_instructions(OpCode::Less, OpCode::Not),
        Token::Less => {
            compiler.emit_instruction(OpCode::Less);
        }
        Token::LessEqual => compiler.emit_instructions(OpCode::Greater, OpCode::Not),
        Token::Plus => {
            compiler.emit_instruction(OpCode::Add);
        }
        Token::Minus => {
            compiler.emit_instruction(OpCode::Subtract);
        }
        Token::Star => {
            compiler.emit_instruction(OpCode::Multiply);
        }
        Token::Slash => {
            compiler.emit_instruction(OpCode::Divide);
        }
        _ => unreachable!(),
    };
}

/// Parse a keyword literal as a prefix. Assumes the keyword has been consumed.
fn literal(compiler: &mut Compiler, _can_assign: bool) {
    match compiler.previous_token() {
        Token::False => compiler.emit_instruction(OpCode::False),
        Token::Null => compiler.emit_instruction(OpCode::Nil),
        Token::True => compiler.emit_instruction(OpCode::True),
        _ => unreachable!(),
    };
}

/// Parse a string literal. Strips the surrounding quotes and interns the contents.
fn string(compiler: &mut Compiler, _can_assign: bool) {
    debug_assert_eq!(Token::StrLiteral, compiler.previous_token());

    let literal = compiler.parser.previous.text();
    let contents = if literal.starts_with('"') && literal.ends_with('"') && literal.len() >= 2 {
        &literal[1..literal.len() - 1]
    } else {
        // Unterminated string: the lexer included everything up to EOF, sans
        // a closing quote. Strip only the opening quote.
        &literal[1..]
    };

    let id = compiler.heap.intern(contents);
    compiler.emit_constant(Value::from(id));
}

/// Parse a variable. It can be either a variable access or assignment, which is why `can_assign`
/// is required.
fn variable(compiler: &mut Compiler, can_assign: bool) {
    let name = compiler.parser.previous.clone();
    compiler.named_variable(name, can_assign);
}

/// Short-circuit `and`: if the left operand is falsy, skip the right operand
/// (leaving the falsy value on the stack); otherwise discard it and evaluate
/// the right operand.
fn and_(compiler: &mut Compiler, _can_assign: bool) {
    let end_jump = compiler.emit_jump(OpCode::JumpIfFalse);

    compiler.emit_instruction(OpCode::Pop);
    compiler.parse_precedence(Precedence::And);

    compiler.patch_jump(end_jump);
}

/// Short-circuit `or`: if the left operand is truthy, skip the right operand;
/// otherwise discard it and evaluate the right operand.
fn or_(compiler: &mut Compiler, _can_assign: bool) {
    let else_jump = compiler.emit_jump(OpCode::JumpIfFalse);
    let end_jump = compiler.emit_jump(OpCode::Jump);

    compiler.patch_jump(else_jump);
    compiler.emit_instruction(OpCode::Pop);

    compiler.parse_precedence(Precedence::Or);
    compiler.patch_jump(end_jump);
}

////////////////////////////////////////////// Tests //////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn precedence_confidence_check() {
        assert!(Precedence::Assignment < Precedence::Or);
        assert!(Precedence::Or < Precedence::And);
        assert!(Precedence::And < Precedence::Equality);
        assert!(Precedence::Equality < Precedence::Comparison);

        assert!(Precedence::Call > Precedence::Factor);
        assert!(Precedence::Factor > Precedence::Term);

        assert_eq!(Precedence::And, Precedence::Or.higher_precedence());
        assert_eq!(Precedence::Factor, Precedence::Term.higher_precedence());
    }

    #[test]
    fn compiles_arithmetic_without_error() {
        let mut heap = Heap::new();
        let chunk = compile("print 1 + 2 * 3;", &mut heap);
        assert!(chunk.is_ok());
    }

    #[test]
    fn reading_uninitialized_local_is_an_error() {
        let mut heap = Heap::new();
        let result = compile("{ var x = x; }", &mut heap);
        assert!(matches!(result, Err(InterpretationError::CompileError)));
    }

    #[test]
    fn global_self_reference_is_not_detected() {
        // Globals don't carry the "declared but uninitialized" marker that
        // locals do, so `var x = x;` at global scope compiles.
        let mut heap = Heap::new();
        let result = compile("var x = x;", &mut heap);
        assert!(result.is_ok());
    }

    #[test]
    fn shadowing_in_the_same_scope_is_an_error() {
        let mut heap = Heap::new();
        let result = compile("{ var a = 1; var a = 2; }", &mut heap);
        assert!(matches!(result, Err(InterpretationError::CompileError)));
    }

    #[test]
    fn shadowing_in_a_deeper_scope_is_allowed() {
        let mut heap = Heap::new();
        let result = compile("{ var a = 1; { var a = 2; } }", &mut heap);
        assert!(result.is_ok());
    }

    #[test]
    fn assigning_to_a_non_lvalue_is_an_error() {
        let mut heap = Heap::new();
        let result = compile("1 + 2 = 3;", &mut heap);
        assert!(matches!(result, Err(InterpretationError::CompileError)));
    }

    #[test]
    fn reserved_bracket_tokens_have_no_grammar() {
        let mut heap = Heap::new();
        let result = compile("var a = [1];", &mut heap);
        assert!(matches!(result, Err(InterpretationError::CompileError)));
    }

    #[test]
    fn if_else_and_while_compile_cleanly() {
        let mut heap = Heap::new();
        let source =
            "var x = 0; while (x < 3) { if (x == 1) print \"one\"; else print x; x = x + 1; }";
        assert!(compile(source, &mut heap).is_ok());
    }
}
