//! Effect classification
//!
//! A function is `Pure` with no frame clauses, `Reads` with only a `reads`
//! clause, and `ReadsWrites` when a `modifies` clause is present (which
//! implies `reads`). Cached per function id.

use crate::{ElabContext, ElabResult};
use lang_ir::{EffectLevel, FunDef, SymbolId};

impl ElabContext<'_> {
    /// Effect level of a function in the input table
    pub fn effect_level(&self, id: SymbolId) -> ElabResult<EffectLevel> {
        if let Some(level) = Self::read_cache(&self.effect_cache, id) {
            return Ok(level);
        }
        let fd = self.function(id)?;
        Ok(self.effect_level_of(fd))
    }

    /// Effect level of a definition already in hand
    pub fn effect_level_of(&self, fd: &FunDef) -> EffectLevel {
        if let Some(level) = Self::read_cache(&self.effect_cache, fd.id) {
            return level;
        }
        let level = fd.spec.effect_level();
        Self::write_cache(&self.effect_cache, fd.id, level);
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lang_ir::{
        ElabConfig, Expr, Flags, FunctionSpec, Reporter, SourceSpan, Symbols, Type,
    };

    fn fun(id: u64, spec: FunctionSpec) -> FunDef {
        FunDef {
            id: SymbolId(id),
            name: format!("f{id}"),
            tparams: vec![],
            params: vec![],
            return_type: Type::Unit,
            body: Expr::unit(),
            spec,
            flags: Flags::default(),
            span: SourceSpan::default(),
        }
    }

    #[test]
    fn test_three_levels() {
        let mut symbols = Symbols::new();
        symbols.add_function(fun(1, FunctionSpec::default()));
        symbols.add_function(fun(
            2,
            FunctionSpec {
                reads: Some(Expr::empty_set(Type::Int)),
                ..FunctionSpec::default()
            },
        ));
        symbols.add_function(fun(
            3,
            FunctionSpec {
                reads: Some(Expr::empty_set(Type::Int)),
                modifies: Some(Expr::empty_set(Type::Int)),
                ..FunctionSpec::default()
            },
        ));
        let config = ElabConfig::default();
        let reporter = Reporter::new();
        let ctx = ElabContext::new(&symbols, &config, &reporter).unwrap();

        assert_eq!(ctx.effect_level(SymbolId(1)).unwrap(), EffectLevel::Pure);
        assert_eq!(ctx.effect_level(SymbolId(2)).unwrap(), EffectLevel::Reads);
        assert_eq!(
            ctx.effect_level(SymbolId(3)).unwrap(),
            EffectLevel::ReadsWrites
        );
    }

    #[test]
    fn test_modifies_alone_is_reads_writes() {
        let mut symbols = Symbols::new();
        symbols.add_function(fun(
            1,
            FunctionSpec {
                modifies: Some(Expr::empty_set(Type::Int)),
                ..FunctionSpec::default()
            },
        ));
        let config = ElabConfig::default();
        let reporter = Reporter::new();
        let ctx = ElabContext::new(&symbols, &config, &reporter).unwrap();
        assert_eq!(
            ctx.effect_level(SymbolId(1)).unwrap(),
            EffectLevel::ReadsWrites
        );
    }
}
