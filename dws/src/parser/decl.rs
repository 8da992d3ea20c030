//! Declarations: type sections, routines, class/record/interface bodies

use super::Parser;
use crate::ast::*;
use crate::error::Result;
use crate::lexer::Token;
use std::rc::Rc;

const VISIBILITY_WORDS: [&str; 5] = ["private", "protected", "public", "published", "strict"];
const DIRECTIVE_WORDS: [&str; 10] = [
    "virtual",
    "override",
    "abstract",
    "overload",
    "reintroduce",
    "static",
    "forward",
    "final",
    "external",
    "empty",
];

impl Parser {
    // ---- sections ----

    pub(super) fn parse_type_section(&mut self) -> Result<Vec<TypeDecl>> {
        let mut decls = vec![self.parse_type_decl()?];
        while self.check_ident() && self.check_at(1, &Token::Eq) {
            decls.push(self.parse_type_decl()?);
        }
        Ok(decls)
    }

    pub(super) fn parse_var_section(&mut self) -> Result<Vec<(Stmt, Span)>> {
        let mut decls = Vec::new();
        loop {
            let span = self.span();
            let decl = self.parse_var_decl()?;
            self.expect(&Token::Semi, "';'")?;
            decls.push((Stmt::Var(decl), span));
            let more = self.check_ident()
                && matches!(self.peek_at(1), Some(Token::Colon | Token::Comma));
            if !more {
                break;
            }
        }
        Ok(decls)
    }

    pub(super) fn parse_const_section(&mut self) -> Result<Vec<(Stmt, Span)>> {
        let mut decls = Vec::new();
        loop {
            let span = self.span();
            let decl = self.parse_const_decl()?;
            self.expect(&Token::Semi, "';'")?;
            decls.push((Stmt::Const(decl), span));
            let more = self.check_ident()
                && matches!(self.peek_at(1), Some(Token::Eq | Token::Colon));
            if !more {
                break;
            }
        }
        Ok(decls)
    }

    /// `a, b: T := init` (without the trailing `;`)
    pub(super) fn parse_var_decl(&mut self) -> Result<VarDecl> {
        let mut names = vec![self.expect_ident()?];
        while self.match_token(&Token::Comma) {
            names.push(self.expect_ident()?);
        }
        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.match_token(&Token::Assign) || self.match_token(&Token::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if ty.is_none() && init.is_none() {
            return Err(self.error_expected("':' or ':='"));
        }
        Ok(VarDecl { names, ty, init })
    }

    /// `N [: T] = value` (without the trailing `;`)
    pub(super) fn parse_const_decl(&mut self) -> Result<ConstDecl> {
        let name = self.expect_ident()?;
        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        if !self.match_token(&Token::Eq) {
            self.expect(&Token::Assign, "'='")?;
        }
        let value = self.parse_expr()?;
        Ok(ConstDecl { name, ty, value })
    }

    // ---- types ----

    pub(super) fn parse_type(&mut self) -> Result<TypeRef> {
        match self.peek() {
            Some(Token::Array) => {
                self.advance();
                let bounds = if self.match_token(&Token::LBracket) {
                    let low = self.parse_expr()?;
                    self.expect(&Token::DotDot, "'..'")?;
                    let high = self.parse_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    Some((Box::new(low), Box::new(high)))
                } else {
                    None
                };
                self.expect(&Token::Of, "'of'")?;
                let elem = self.parse_type()?;
                Ok(TypeRef::Array {
                    bounds,
                    elem: Box::new(elem),
                })
            }
            Some(Token::Set) => {
                self.advance();
                self.expect(&Token::Of, "'of'")?;
                Ok(TypeRef::Set(Box::new(self.parse_type()?)))
            }
            Some(Token::Class) => {
                self.advance();
                self.expect(&Token::Of, "'of'")?;
                Ok(TypeRef::ClassOf(self.expect_ident()?.node))
            }
            Some(Token::Function | Token::Procedure) => {
                let is_function = self.check(&Token::Function);
                self.advance();
                let params = if self.check(&Token::LParen) {
                    self.parse_params()?
                } else {
                    Vec::new()
                };
                let ret = if is_function {
                    self.expect(&Token::Colon, "':'")?;
                    Some(Box::new(self.parse_type()?))
                } else {
                    None
                };
                let of_object = if self.check(&Token::Of) && self.check_at(1, &Token::Ident(String::new())) {
                    self.advance();
                    self.expect_word("object")?;
                    true
                } else {
                    false
                };
                Ok(TypeRef::Routine {
                    params,
                    ret,
                    of_object,
                })
            }
            Some(Token::Ident(_)) => Ok(TypeRef::Named(self.expect_ident()?.node)),
            _ => Err(self.error_expected("type")),
        }
    }

    fn parse_type_decl(&mut self) -> Result<TypeDecl> {
        let name = self.expect_ident()?;
        let start = name.span;
        self.expect(&Token::Eq, "'='")?;

        let kind = match self.peek() {
            Some(Token::Class) if self.check_at(1, &Token::Of) => {
                TypeDeclKind::Alias(self.parse_type()?)
            }
            Some(Token::Class) => {
                self.advance();
                if self.match_word("helper") {
                    TypeDeclKind::Helper(self.parse_helper_body()?)
                } else {
                    TypeDeclKind::Class(self.parse_class_body()?)
                }
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("partial") => {
                self.advance();
                self.expect(&Token::Class, "'class'")?;
                TypeDeclKind::Class(self.parse_class_body()?)
            }
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("helper") => {
                self.advance();
                TypeDeclKind::Helper(self.parse_helper_body()?)
            }
            Some(Token::LParen) => TypeDeclKind::Enum(self.parse_enum_body(EnumKind::Plain)?),
            Some(Token::Ident(word))
                if (word.eq_ignore_ascii_case("enum") || word.eq_ignore_ascii_case("flags"))
                    && self.check_at(1, &Token::LParen) =>
            {
                let kind = if word.eq_ignore_ascii_case("flags") {
                    EnumKind::Flags
                } else {
                    EnumKind::Scoped
                };
                self.advance();
                TypeDeclKind::Enum(self.parse_enum_body(kind)?)
            }
            Some(Token::Interface) => {
                self.advance();
                TypeDeclKind::Interface(self.parse_interface_body()?)
            }
            Some(Token::Record) => {
                self.advance();
                if self.match_word("helper") {
                    TypeDeclKind::Helper(self.parse_helper_body()?)
                } else {
                    let members = self.parse_members(true)?;
                    self.expect(&Token::End, "'end'")?;
                    TypeDeclKind::Record(RecordDecl { members })
                }
            }
            _ => TypeDeclKind::Alias(self.parse_type()?),
        };

        let span = start.merge(self.prev_span());
        self.expect(&Token::Semi, "';'")?;
        Ok(TypeDecl { name, kind, span })
    }

    fn parse_enum_body(&mut self, kind: EnumKind) -> Result<EnumDecl> {
        self.expect(&Token::LParen, "'('")?;
        let mut members = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let value = if self.match_token(&Token::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            members.push(EnumMember { name, value });
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')'")?;
        Ok(EnumDecl { kind, members })
    }

    fn parse_class_body(&mut self) -> Result<ClassDecl> {
        let mut decl = ClassDecl::default();

        if self.check(&Token::Semi) {
            decl.is_forward = true;
            return Ok(decl);
        }

        loop {
            if self.match_word("abstract") {
                decl.is_abstract = true;
            } else if self.match_word("external") {
                decl.is_external = true;
                if matches!(self.peek(), Some(Token::StrLit(_))) {
                    self.advance();
                }
            } else if !(self.match_word("sealed") || self.match_word("static")) {
                break;
            }
        }

        if self.match_token(&Token::LParen) {
            let first = self.expect_ident()?;
            decl.parent = Some(first);
            while self.match_token(&Token::Comma) {
                decl.interfaces.push(self.expect_ident()?);
            }
            self.expect(&Token::RParen, "')'")?;
        }

        // `TFoo = class(TBase);` declares an empty class
        if self.check(&Token::Semi) {
            return Ok(decl);
        }

        decl.members = self.parse_members(false)?;
        self.expect(&Token::End, "'end'")?;
        Ok(decl)
    }

    fn parse_interface_body(&mut self) -> Result<InterfaceDecl> {
        let mut decl = InterfaceDecl::default();
        if self.check(&Token::Semi) {
            decl.is_forward = true;
            return Ok(decl);
        }
        if self.match_token(&Token::LParen) {
            decl.parent = Some(self.expect_ident()?);
            self.expect(&Token::RParen, "')'")?;
        }
        // optional GUID
        if self.check(&Token::LBracket) {
            self.advance();
            while !self.check(&Token::RBracket) && !self.at_end() {
                self.advance();
            }
            self.expect(&Token::RBracket, "']'")?;
        }

        while !self.check(&Token::End) {
            if self.at_end() {
                return Err(self.error_expected("'end'"));
            }
            match self.peek() {
                Some(Token::Procedure | Token::Function) => {
                    decl.methods.push(Rc::new(self.parse_routine_header(false, false)?));
                }
                Some(Token::Property) => {
                    self.advance();
                    decl.properties.push(self.parse_property(false)?);
                }
                Some(Token::Semi) => {
                    self.advance();
                }
                _ => return Err(self.error_expected("method or property")),
            }
        }
        self.expect(&Token::End, "'end'")?;
        Ok(decl)
    }

    fn parse_helper_body(&mut self) -> Result<HelperDecl> {
        let parent = if self.match_token(&Token::LParen) {
            let parent = self.expect_ident()?;
            self.expect(&Token::RParen, "')'")?;
            Some(parent)
        } else {
            None
        };
        self.expect(&Token::For, "'for'")?;
        let target = self.parse_type()?;
        let members = self.parse_members(true)?;
        self.expect(&Token::End, "'end'")?;
        Ok(HelperDecl {
            target,
            parent,
            members,
        })
    }

    /// Members of a class, record or helper body, up to (not including) `end`
    fn parse_members(&mut self, is_record: bool) -> Result<Vec<Member>> {
        let mut members = Vec::new();
        let mut class_var_section = false;

        while !self.check(&Token::End) {
            if self.at_end() {
                return Err(self.error_expected("'end'"));
            }

            if VISIBILITY_WORDS.iter().any(|w| self.check_word(w)) {
                self.advance();
                class_var_section = false;
                continue;
            }

            match self.peek() {
                Some(Token::Semi) => {
                    self.advance();
                }
                Some(Token::Class) => {
                    self.advance();
                    match self.peek() {
                        Some(Token::Var) => {
                            self.advance();
                            class_var_section = true;
                            members.push(Member::Field(self.parse_field(true)?));
                        }
                        Some(Token::Property) => {
                            self.advance();
                            members.push(Member::Property(self.parse_property(true)?));
                        }
                        Some(Token::Const) => {
                            self.advance();
                            members.extend(self.parse_member_consts()?);
                        }
                        _ => {
                            class_var_section = false;
                            members.push(Member::Method(self.parse_routine(true, false)?));
                        }
                    }
                }
                Some(Token::Var) => {
                    self.advance();
                    class_var_section = false;
                    members.push(Member::Field(self.parse_field(false)?));
                }
                Some(Token::Const) => {
                    self.advance();
                    class_var_section = false;
                    members.extend(self.parse_member_consts()?);
                }
                Some(
                    Token::Procedure | Token::Function | Token::Constructor | Token::Destructor,
                ) => {
                    class_var_section = false;
                    members.push(Member::Method(self.parse_routine(false, false)?));
                }
                Some(Token::Property) => {
                    self.advance();
                    class_var_section = false;
                    members.push(Member::Property(self.parse_property(false)?));
                }
                Some(Token::Ident(_)) => {
                    members.push(Member::Field(self.parse_field(class_var_section)?));
                }
                _ => {
                    let what = if is_record { "record member" } else { "class member" };
                    return Err(self.error_expected(what));
                }
            }
        }
        Ok(members)
    }

    fn parse_field(&mut self, is_class: bool) -> Result<FieldDecl> {
        let mut names = vec![self.expect_ident()?];
        while self.match_token(&Token::Comma) {
            names.push(self.expect_ident()?);
        }
        let ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let init = if self.match_token(&Token::Assign) || self.match_token(&Token::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        if ty.is_none() && init.is_none() {
            return Err(self.error_expected("':'"));
        }
        self.expect(&Token::Semi, "';'")?;
        Ok(FieldDecl {
            names,
            ty,
            init,
            is_class,
        })
    }

    fn parse_member_consts(&mut self) -> Result<Vec<Member>> {
        let mut consts = Vec::new();
        loop {
            consts.push(Member::Const(self.parse_const_decl()?));
            self.expect(&Token::Semi, "';'")?;
            let more = self.check_ident()
                && matches!(self.peek_at(1), Some(Token::Eq | Token::Colon))
                && !VISIBILITY_WORDS.iter().any(|w| self.check_word(w));
            if !more {
                break;
            }
        }
        Ok(consts)
    }

    fn parse_property(&mut self, is_class: bool) -> Result<PropertyDecl> {
        let name = self.expect_ident()?;
        let index_params = if self.match_token(&Token::LBracket) {
            let params = self.parse_param_list(&Token::RBracket)?;
            self.expect(&Token::RBracket, "']'")?;
            params
        } else {
            Vec::new()
        };
        self.expect(&Token::Colon, "':'")?;
        let ty = self.parse_type()?;

        let mut read = None;
        let mut write = None;
        loop {
            if self.match_word("read") {
                read = Some(self.expect_member_name()?);
            } else if self.match_word("write") {
                write = Some(self.expect_member_name()?);
            } else {
                break;
            }
        }

        let mut is_default = self.match_word("default");
        self.expect(&Token::Semi, "';'")?;
        if self.check_word("default") && self.check_at(1, &Token::Semi) {
            self.advance();
            self.advance();
            is_default = true;
        }

        Ok(PropertyDecl {
            name,
            index_params,
            ty,
            read,
            write,
            is_class,
            is_default,
        })
    }

    // ---- routines ----

    /// Parameter list including the surrounding parentheses
    pub(super) fn parse_params(&mut self) -> Result<Vec<Param>> {
        self.expect(&Token::LParen, "'('")?;
        let params = self.parse_param_list(&Token::RParen)?;
        self.expect(&Token::RParen, "')'")?;
        Ok(params)
    }

    fn parse_param_list(&mut self, close: &Token) -> Result<Vec<Param>> {
        let mut params = Vec::new();
        if self.check(close) {
            return Ok(params);
        }
        loop {
            let mode = match self.peek() {
                Some(Token::Var) => {
                    self.advance();
                    ParamMode::Var
                }
                Some(Token::Const) => {
                    self.advance();
                    ParamMode::Const
                }
                Some(Token::Ident(w))
                    if (w.eq_ignore_ascii_case("lazy") || w.eq_ignore_ascii_case("out"))
                        && self.check_at(1, &Token::Ident(String::new())) =>
                {
                    let mode = if w.eq_ignore_ascii_case("lazy") {
                        ParamMode::Lazy
                    } else {
                        ParamMode::Out
                    };
                    self.advance();
                    mode
                }
                _ => ParamMode::Value,
            };

            let mut names = vec![self.expect_ident()?];
            while self.match_token(&Token::Comma) {
                names.push(self.expect_ident()?);
            }
            let ty = if self.match_token(&Token::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            let default = if self.match_token(&Token::Eq) || self.match_token(&Token::Assign) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            for name in names {
                params.push(Param {
                    name,
                    ty: ty.clone(),
                    mode,
                    default: default.clone(),
                });
            }

            if !self.match_token(&Token::Semi) && !self.match_token(&Token::Comma) {
                break;
            }
        }
        Ok(params)
    }

    /// Routine header and, when present, its body.
    ///
    /// `top_level` routines always carry a body unless marked `forward`;
    /// routines inside a class body only carry one when it follows inline.
    pub(super) fn parse_routine(&mut self, is_class: bool, top_level: bool) -> Result<Rc<RoutineDecl>> {
        let mut decl = self.parse_routine_header(is_class, true)?;

        let has_body = if top_level {
            !decl.directives.is_forward && !decl.directives.is_abstract
        } else {
            matches!(self.peek(), Some(Token::Begin | Token::Var))
                || self.check_word("require")
        };

        if has_body {
            self.parse_routine_body(&mut decl)?;
        }
        Ok(Rc::new(decl))
    }

    /// `procedure Name[.Method][(params)][: T]; directives`
    pub(super) fn parse_routine_header(&mut self, is_class: bool, allow_owner: bool) -> Result<RoutineDecl> {
        let start = self.span();
        let kind = match self.advance() {
            Some((Token::Procedure, _)) => RoutineKind::Procedure,
            Some((Token::Function, _)) => RoutineKind::Function,
            Some((Token::Constructor, _)) => RoutineKind::Constructor,
            Some((Token::Destructor, _)) => RoutineKind::Destructor,
            _ => return Err(self.error_expected("routine")),
        };

        let mut name = self.expect_ident()?;
        let mut owner = None;
        if allow_owner && self.match_token(&Token::Dot) {
            owner = Some(name);
            name = self.expect_member_name()?;
        }

        let params = if self.check(&Token::LParen) {
            self.parse_params()?
        } else {
            Vec::new()
        };

        let ret_ty = if self.match_token(&Token::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let span = start.merge(self.prev_span());
        self.expect(&Token::Semi, "';'")?;

        let directives = self.parse_directives()?;

        Ok(RoutineDecl {
            name,
            owner,
            kind,
            is_class,
            params,
            ret_ty,
            directives,
            require: Vec::new(),
            ensure: Vec::new(),
            body: None,
            span,
        })
    }

    fn parse_directives(&mut self) -> Result<Directives> {
        let mut d = Directives::default();
        while let Some(word) = DIRECTIVE_WORDS.iter().find(|w| self.check_word(w)) {
            self.advance();
            match *word {
                "virtual" => d.is_virtual = true,
                "override" => d.is_override = true,
                "abstract" => d.is_abstract = true,
                "overload" => d.is_overload = true,
                "reintroduce" => d.is_reintroduce = true,
                "static" => d.is_static = true,
                "forward" => d.is_forward = true,
                "external" => {
                    d.is_forward = true;
                    if matches!(self.peek(), Some(Token::StrLit(_))) {
                        self.advance();
                    }
                }
                _ => {}
            }
            self.expect(&Token::Semi, "';'")?;
        }
        Ok(d)
    }

    /// Local sections, contracts and `begin ... end;`
    fn parse_routine_body(&mut self, decl: &mut RoutineDecl) -> Result<()> {
        let mut body = Body::default();

        loop {
            match self.peek() {
                Some(Token::Var) => {
                    self.advance();
                    for (stmt, span) in self.parse_var_section()? {
                        body.stmts.push(Spanned::new(stmt, span));
                    }
                }
                Some(Token::Const) => {
                    self.advance();
                    for (stmt, span) in self.parse_const_section()? {
                        body.stmts.push(Spanned::new(stmt, span));
                    }
                }
                Some(Token::Procedure | Token::Function) => {
                    body.nested.push(self.parse_routine(false, true)?);
                }
                Some(Token::Ident(w)) if w.eq_ignore_ascii_case("require") => {
                    self.advance();
                    decl.require = self.parse_contracts(false)?;
                }
                _ => break,
            }
        }

        self.expect(&Token::Begin, "'begin'")?;
        body.stmts.extend(self.parse_stmt_list()?);
        if self.match_word("ensure") {
            decl.ensure = self.parse_contracts(true)?;
        }
        self.expect(&Token::End, "'end'")?;
        self.expect(&Token::Semi, "';'")?;

        decl.body = Some(body);
        Ok(())
    }

    fn parse_contracts(&mut self, ensure: bool) -> Result<Vec<Contract>> {
        let saved = self.in_ensure;
        self.in_ensure = ensure;
        let mut contracts = Vec::new();
        loop {
            let stop = match self.peek() {
                None => true,
                Some(Token::Begin | Token::Var | Token::Const | Token::End) => true,
                Some(_) => false,
            };
            if stop {
                break;
            }
            let cond = self.parse_expr()?;
            let message = if self.match_token(&Token::Colon) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(&Token::Semi, "';'")?;
            contracts.push(Contract { cond, message });
        }
        self.in_ensure = saved;
        Ok(contracts)
    }

    /// Anonymous routine body after the header: `begin ... end` with
    /// optional local sections, no trailing `;`
    pub(super) fn parse_anonymous_body(&mut self) -> Result<Body> {
        let mut body = Body::default();
        loop {
            match self.peek() {
                Some(Token::Var) => {
                    self.advance();
                    for (stmt, span) in self.parse_var_section()? {
                        body.stmts.push(Spanned::new(stmt, span));
                    }
                }
                Some(Token::Const) => {
                    self.advance();
                    for (stmt, span) in self.parse_const_section()? {
                        body.stmts.push(Spanned::new(stmt, span));
                    }
                }
                _ => break,
            }
        }
        self.expect(&Token::Begin, "'begin'")?;
        body.stmts.extend(self.parse_stmt_list()?);
        self.expect(&Token::End, "'end'")?;
        Ok(body)
    }
}
