//! Token definitions

use logos::Logos;
use std::fmt;

fn unquote(slice: &str, quote: char) -> String {
    let inner = &slice[1..slice.len() - 1];
    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}

fn char_code(slice: &str) -> Option<u32> {
    let digits = &slice[1..];
    match digits.strip_prefix('$') {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => digits.parse().ok(),
    }
}

/// DWS token. Keywords are case-insensitive.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"\{[^}]*\}")]
#[logos(skip r"\(\*([^*]|\*+[^*)])*\*+\)")]
pub enum Token {
    // Keywords
    #[token("and", ignore(ascii_case))]
    And,
    #[token("array", ignore(ascii_case))]
    Array,
    #[token("as", ignore(ascii_case))]
    As,
    #[token("begin", ignore(ascii_case))]
    Begin,
    #[token("break", ignore(ascii_case))]
    Break,
    #[token("case", ignore(ascii_case))]
    Case,
    #[token("class", ignore(ascii_case))]
    Class,
    #[token("const", ignore(ascii_case))]
    Const,
    #[token("constructor", ignore(ascii_case))]
    Constructor,
    #[token("continue", ignore(ascii_case))]
    Continue,
    #[token("destructor", ignore(ascii_case))]
    Destructor,
    #[token("div", ignore(ascii_case))]
    Div,
    #[token("do", ignore(ascii_case))]
    Do,
    #[token("downto", ignore(ascii_case))]
    Downto,
    #[token("else", ignore(ascii_case))]
    Else,
    #[token("end", ignore(ascii_case))]
    End,
    #[token("except", ignore(ascii_case))]
    Except,
    #[token("exit", ignore(ascii_case))]
    Exit,
    #[token("false", ignore(ascii_case))]
    False,
    #[token("finally", ignore(ascii_case))]
    Finally,
    #[token("for", ignore(ascii_case))]
    For,
    #[token("function", ignore(ascii_case))]
    Function,
    #[token("if", ignore(ascii_case))]
    If,
    #[token("implements", ignore(ascii_case))]
    Implements,
    #[token("in", ignore(ascii_case))]
    In,
    #[token("inherited", ignore(ascii_case))]
    Inherited,
    #[token("interface", ignore(ascii_case))]
    Interface,
    #[token("is", ignore(ascii_case))]
    Is,
    #[token("lambda", ignore(ascii_case))]
    Lambda,
    #[token("mod", ignore(ascii_case))]
    Mod,
    #[token("new", ignore(ascii_case))]
    New,
    #[token("nil", ignore(ascii_case))]
    Nil,
    #[token("not", ignore(ascii_case))]
    Not,
    #[token("of", ignore(ascii_case))]
    Of,
    #[token("on", ignore(ascii_case))]
    On,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("procedure", ignore(ascii_case))]
    Procedure,
    #[token("program", ignore(ascii_case))]
    Program,
    #[token("property", ignore(ascii_case))]
    Property,
    #[token("raise", ignore(ascii_case))]
    Raise,
    #[token("record", ignore(ascii_case))]
    Record,
    #[token("repeat", ignore(ascii_case))]
    Repeat,
    #[token("self", ignore(ascii_case))]
    SelfKw,
    #[token("set", ignore(ascii_case))]
    Set,
    #[token("shl", ignore(ascii_case))]
    Shl,
    #[token("shr", ignore(ascii_case))]
    Shr,
    #[token("then", ignore(ascii_case))]
    Then,
    #[token("to", ignore(ascii_case))]
    To,
    #[token("true", ignore(ascii_case))]
    True,
    #[token("try", ignore(ascii_case))]
    Try,
    #[token("type", ignore(ascii_case))]
    Type,
    #[token("until", ignore(ascii_case))]
    Until,
    #[token("var", ignore(ascii_case))]
    Var,
    #[token("while", ignore(ascii_case))]
    While,
    #[token("xor", ignore(ascii_case))]
    Xor,

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    #[regex(r"\$[0-9a-fA-F]+", |lex| i64::from_str_radix(&lex.slice()[1..], 16).ok())]
    IntLit(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLit(f64),

    #[regex(r"'([^'\n]|'')*'", |lex| unquote(lex.slice(), '\''))]
    #[regex(r#""([^"\n]|"")*""#, |lex| unquote(lex.slice(), '"'))]
    StrLit(String),

    /// `#65`, `#$41`
    #[regex(r"#[0-9]+", |lex| char_code(lex.slice()))]
    #[regex(r"#\$[0-9a-fA-F]+", |lex| char_code(lex.slice()))]
    CharCode(u32),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Operators
    #[token(":=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("=")]
    Eq,
    #[token("<>")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("=>")]
    FatArrow,
    #[token("@")]
    At,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
}

impl Token {
    /// Whether this is the given contextual word (`virtual`, `read`, ...)
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self, Token::Ident(name) if name.eq_ignore_ascii_case(word))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::IntLit(n) => write!(f, "{n}"),
            Token::FloatLit(x) => write!(f, "{x}"),
            Token::StrLit(s) => write!(f, "'{s}'"),
            Token::CharCode(c) => write!(f, "#{c}"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Assign => write!(f, ":="),
            Token::PlusAssign => write!(f, "+="),
            Token::MinusAssign => write!(f, "-="),
            Token::StarAssign => write!(f, "*="),
            Token::SlashAssign => write!(f, "/="),
            Token::Eq => write!(f, "="),
            Token::Ne => write!(f, "<>"),
            Token::Le => write!(f, "<="),
            Token::Ge => write!(f, ">="),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::FatArrow => write!(f, "=>"),
            Token::At => write!(f, "@"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Semi => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::DotDot => write!(f, ".."),
            Token::Dot => write!(f, "."),
            keyword => write!(f, "{}", format!("{keyword:?}").to_lowercase().trim_end_matches("kw")),
        }
    }
}
