//! Rule and feature DSL parser.
//!
//! Recursive descent parser for the rule, feature and leverage-trigger
//! grammars.
//! Converts text to AST with meaningful error messages including character
//! offset, expected/found tokens.

use crate::domain::error::ParseError;
use crate::domain::feature::{FeatureKind, FeatureSpec, Regime, Source};
use crate::domain::indicator::{IndicatorField, IndicatorType};
use crate::domain::risk::Trigger;
use crate::domain::rule::{Operand, Rule};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        let remaining = self.remaining();
        remaining.starts_with(keyword)
            && (remaining.len() == keyword.len()
                || !remaining[keyword.len()..]
                    .chars()
                    .next()
                    .map(|c| c.is_alphanumeric() || c == '_')
                    .unwrap_or(false))
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            let found = self.peek_word();
            Err(self.error(format!("expected '{}', found '{}'", keyword, found)))
        }
    }

    fn peek_word(&self) -> String {
        let mut word = String::new();
        for ch in self.remaining().chars() {
            if ch.is_alphanumeric() || ch == '_' {
                word.push(ch);
            } else {
                break;
            }
        }
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_integer(&mut self) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut digits = 0;

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected integer".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<usize>().map_err(|_| ParseError {
            message: format!("invalid integer: {}", num_str),
            position: start,
        })
    }

    /// An integer that must be at least 1 (periods, lags, counts).
    fn parse_count(&mut self, what: &str) -> Result<usize, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let n = self.parse_integer()?;
        if n == 0 {
            return Err(ParseError {
                message: format!("{} must be at least 1", what),
                position: start,
            });
        }
        Ok(n)
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {}
            _ => {
                let found = self.peek_word();
                return Err(self.error(format!("expected column name, found '{}'", found)));
            }
        }
        let word = self.peek_word();
        self.pos += word.len();
        Ok(word)
    }

    fn parse_source(&mut self) -> Result<Source, ParseError> {
        Ok(Source::from_name(&self.parse_identifier()?))
    }

    fn parse_operand(&mut self) -> Result<Operand, ParseError> {
        self.skip_whitespace();

        if self
            .peek()
            .is_some_and(|ch| ch.is_ascii_digit() || ch == '-' || ch == '.')
        {
            let num = self.parse_number()?;
            return Ok(Operand::Constant(num));
        }

        let name = self.parse_identifier()?;
        // no whitespace between a column and its lag
        if self.peek() == Some('[') {
            self.advance();
            let lag = self.parse_integer()?;
            self.expect_char(']')?;
            return Ok(Operand::Column { name, lag });
        }
        Ok(Operand::Column { name, lag: 0 })
    }

    fn parse_comparison(&mut self, keyword: &str) -> Result<Rule, ParseError> {
        self.expect_keyword(keyword)?;
        self.expect_char('(')?;

        let left = self.parse_operand()?;
        self.expect_char(',')?;
        let right = self.parse_operand()?;
        self.expect_char(')')?;

        Ok(match keyword {
            "CROSS_ABOVE" => Rule::CrossAbove { left, right },
            "CROSS_BELOW" => Rule::CrossBelow { left, right },
            "ABOVE" => Rule::Above { left, right },
            "BELOW" => Rule::Below { left, right },
            "AT_LEAST" => Rule::AtLeast { left, right },
            "AT_MOST" => Rule::AtMost { left, right },
            _ => Rule::Equals { left, right },
        })
    }

    fn parse_between(&mut self) -> Result<Rule, ParseError> {
        self.expect_keyword("BETWEEN")?;
        self.expect_char('(')?;

        let operand = self.parse_operand()?;
        self.expect_char(',')?;
        let lower = self.parse_number()?;
        self.expect_char(',')?;
        let upper = self.parse_number()?;
        self.expect_char(')')?;

        Ok(Rule::Between {
            operand,
            lower,
            upper,
        })
    }

    fn parse_regime(&mut self) -> Result<Rule, ParseError> {
        let (column, regimes) = self.parse_regime_args()?;
        Ok(Rule::InRegime { column, regimes })
    }

    /// `REGIME(column, R1, R2, ...)`.
    fn parse_regime_args(&mut self) -> Result<(String, Vec<Regime>), ParseError> {
        self.expect_keyword("REGIME")?;
        self.expect_char('(')?;
        let column = self.parse_identifier()?;

        let mut regimes = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            self.skip_whitespace();
            let word = self.peek_word();
            let regime = Regime::from_keyword(&word).ok_or_else(|| {
                self.error(format!(
                    "expected TRENDING, VOLATILE or RANGING, found '{}'",
                    word
                ))
            })?;
            self.pos += word.len();
            regimes.push(regime);
        }

        if regimes.is_empty() {
            return Err(self.error("REGIME requires at least 1 regime"));
        }
        Ok((column, regimes))
    }

    fn parse_rule(&mut self) -> Result<Rule, ParseError> {
        self.skip_whitespace();

        for keyword in [
            "CROSS_ABOVE",
            "CROSS_BELOW",
            "ABOVE",
            "BELOW",
            "AT_LEAST",
            "AT_MOST",
            "EQUALS",
        ] {
            if self.peek_keyword(keyword) {
                return self.parse_comparison(keyword);
            }
        }
        if self.peek_keyword("BETWEEN") {
            return self.parse_between();
        }
        if self.peek_keyword("REGIME") {
            return self.parse_regime();
        }

        if self.peek_keyword("AND") {
            return self.parse_and();
        }
        if self.peek_keyword("OR") {
            return self.parse_or();
        }
        if self.peek_keyword("NOT") {
            return self.parse_not();
        }

        if self.peek_keyword("CONSECUTIVE") {
            return self.parse_consecutive();
        }
        if self.peek_keyword("ANY_OF") {
            return self.parse_any_of();
        }

        let word = self.peek_word();
        Err(self.error(format!("expected rule, found '{}'", word)))
    }

    fn parse_rule_list(&mut self, keyword: &str) -> Result<Vec<Rule>, ParseError> {
        self.expect_keyword(keyword)?;
        self.expect_char('(')?;

        let mut rules = Vec::new();
        rules.push(self.parse_rule()?);

        loop {
            self.skip_whitespace();
            if self.peek() == Some(')') {
                self.advance();
                break;
            }
            self.expect_char(',')?;
            rules.push(self.parse_rule()?);
        }

        if rules.len() < 2 {
            return Err(self.error(format!("{} requires at least 2 rules", keyword)));
        }
        Ok(rules)
    }

    fn parse_and(&mut self) -> Result<Rule, ParseError> {
        Ok(Rule::And(self.parse_rule_list("AND")?))
    }

    fn parse_or(&mut self) -> Result<Rule, ParseError> {
        Ok(Rule::Or(self.parse_rule_list("OR")?))
    }

    fn parse_not(&mut self) -> Result<Rule, ParseError> {
        self.expect_keyword("NOT")?;
        self.expect_char('(')?;
        let rule = self.parse_rule()?;
        self.expect_char(')')?;
        Ok(Rule::Not(Box::new(rule)))
    }

    fn parse_consecutive(&mut self) -> Result<Rule, ParseError> {
        self.expect_keyword("CONSECUTIVE")?;
        self.expect_char('(')?;
        let rule = self.parse_rule()?;
        self.expect_char(',')?;
        let count = self.parse_count("count")?;
        self.expect_char(')')?;
        Ok(Rule::Consecutive {
            rule: Box::new(rule),
            count,
        })
    }

    fn parse_any_of(&mut self) -> Result<Rule, ParseError> {
        self.expect_keyword("ANY_OF")?;
        self.expect_char('(')?;
        let rule = self.parse_rule()?;
        self.expect_char(',')?;
        let count = self.parse_count("count")?;
        self.expect_char(')')?;
        Ok(Rule::AnyOf {
            rule: Box::new(rule),
            count,
        })
    }

    fn expect_end(&mut self, what: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after {}: '{}'",
                what,
                self.remaining()
            )));
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<Rule, ParseError> {
        let rule = self.parse_rule()?;
        self.expect_end("rule")?;
        Ok(rule)
    }

    // --- risk trigger grammar ---

    fn parse_trigger(&mut self) -> Result<Trigger, ParseError> {
        self.skip_whitespace();
        if self.peek_keyword("REGIME") {
            let (column, regimes) = self.parse_regime_args()?;
            return Ok(Trigger::Regime { column, regimes });
        }
        for keyword in ["FEATURE_ABOVE", "FEATURE_BELOW"] {
            if self.consume_keyword(keyword) {
                self.expect_char('(')?;
                let column = self.parse_identifier()?;
                self.expect_char(',')?;
                let threshold = self.parse_number()?;
                self.expect_char(')')?;
                return Ok(if keyword == "FEATURE_ABOVE" {
                    Trigger::FeatureAbove { column, threshold }
                } else {
                    Trigger::FeatureBelow { column, threshold }
                });
            }
        }
        for keyword in ["PROFIT_ABOVE", "PROFIT_BELOW"] {
            if self.consume_keyword(keyword) {
                self.expect_char('(')?;
                let threshold = self.parse_number()?;
                self.expect_char(')')?;
                return Ok(if keyword == "PROFIT_ABOVE" {
                    Trigger::ProfitAbove(threshold)
                } else {
                    Trigger::ProfitBelow(threshold)
                });
            }
        }
        if self.consume_keyword("ANY") {
            self.expect_char('(')?;
            let mut triggers = vec![self.parse_trigger()?];
            loop {
                self.skip_whitespace();
                if self.peek() == Some(')') {
                    self.advance();
                    break;
                }
                self.expect_char(',')?;
                triggers.push(self.parse_trigger()?);
            }
            return Ok(Trigger::Any(triggers));
        }

        let word = self.peek_word();
        Err(self.error(format!("expected trigger, found '{}'", word)))
    }

    // --- feature grammar ---

    /// `NAME(source, period)` for single-source windowed indicators.
    fn parse_windowed(&mut self, make: fn(usize) -> IndicatorType) -> Result<FeatureKind, ParseError> {
        self.expect_char('(')?;
        let source = self.parse_source()?;
        self.expect_char(',')?;
        let period = self.parse_count("period")?;
        self.expect_char(')')?;
        Ok(FeatureKind::Indicator {
            indicator: make(period),
            field: IndicatorField::Value,
            source: Some(source),
        })
    }

    /// `NAME(period)` for candle-based indicators.
    fn parse_candle_indicator(
        &mut self,
        make: fn(usize) -> IndicatorType,
    ) -> Result<FeatureKind, ParseError> {
        self.expect_char('(')?;
        let period = self.parse_count("period")?;
        self.expect_char(')')?;
        Ok(FeatureKind::Indicator {
            indicator: make(period),
            field: IndicatorField::Value,
            source: None,
        })
    }

    fn parse_macd(&mut self, field: IndicatorField) -> Result<FeatureKind, ParseError> {
        self.expect_char('(')?;
        let source = self.parse_source()?;
        self.expect_char(',')?;
        let fast = self.parse_count("fast period")?;
        self.expect_char(',')?;
        let slow = self.parse_count("slow period")?;
        self.expect_char(',')?;
        let signal = self.parse_count("signal period")?;
        self.expect_char(')')?;
        Ok(FeatureKind::Indicator {
            indicator: IndicatorType::Macd { fast, slow, signal },
            field,
            source: Some(source),
        })
    }

    fn parse_bollinger(&mut self, field: IndicatorField) -> Result<FeatureKind, ParseError> {
        self.expect_char('(')?;
        let source = self.parse_source()?;
        self.expect_char(',')?;
        let period = self.parse_count("period")?;
        self.expect_char(',')?;
        self.skip_whitespace();
        let start = self.pos;
        let mult = self.parse_number()?;
        if !mult.is_finite() || mult < 0.0 {
            return Err(ParseError {
                message: "BOLLINGER multiplier must be finite and non-negative".to_string(),
                position: start,
            });
        }
        self.expect_char(')')?;
        Ok(FeatureKind::Indicator {
            indicator: IndicatorType::bollinger(period, mult),
            field,
            source: Some(source),
        })
    }

    fn parse_sar(&mut self) -> Result<FeatureKind, ParseError> {
        self.expect_char('(')?;
        self.skip_whitespace();
        let start = self.pos;
        let accel = self.parse_number()?;
        self.expect_char(',')?;
        let max = self.parse_number()?;
        self.expect_char(')')?;
        if !accel.is_finite() || !max.is_finite() || accel <= 0.0 || max < accel {
            return Err(ParseError {
                message: "SAR needs 0 < accel <= max".to_string(),
                position: start,
            });
        }
        Ok(FeatureKind::Indicator {
            indicator: IndicatorType::sar(accel, max),
            field: IndicatorField::Value,
            source: None,
        })
    }

    fn parse_vwap(&mut self) -> Result<FeatureKind, ParseError> {
        self.skip_whitespace();
        let reset = if self.peek() == Some('(') {
            self.advance();
            let n = self.parse_count("reset")?;
            self.expect_char(')')?;
            n
        } else {
            0
        };
        Ok(FeatureKind::Indicator {
            indicator: IndicatorType::Vwap { reset },
            field: IndicatorField::Value,
            source: None,
        })
    }

    fn parse_sources<const N: usize>(&mut self) -> Result<[Source; N], ParseError> {
        self.expect_char('(')?;
        let mut out: Vec<Source> = Vec::with_capacity(N);
        for i in 0..N {
            if i > 0 {
                self.expect_char(',')?;
            }
            out.push(self.parse_source()?);
        }
        self.expect_char(')')?;
        out.try_into()
            .map_err(|_| self.error(format!("expected {} columns", N)))
    }

    fn parse_spread(&mut self, absolute: bool) -> Result<FeatureKind, ParseError> {
        self.expect_char('(')?;
        let left = self.parse_source()?;
        self.expect_char(',')?;
        let right = self.parse_source()?;
        self.skip_whitespace();
        let scale = if self.peek() == Some(',') {
            self.advance();
            Some(self.parse_source()?)
        } else {
            None
        };
        self.expect_char(')')?;
        Ok(FeatureKind::Spread {
            left,
            right,
            scale,
            absolute,
        })
    }

    fn parse_shift(&mut self, is_lag: bool) -> Result<FeatureKind, ParseError> {
        self.expect_char('(')?;
        let source = self.parse_source()?;
        self.expect_char(',')?;
        let lag = self.parse_count("lag")?;
        self.expect_char(')')?;
        Ok(if is_lag {
            FeatureKind::Lag { source, lag }
        } else {
            FeatureKind::Change { source, lag }
        })
    }

    fn parse_regime_feature(&mut self) -> Result<FeatureKind, ParseError> {
        self.expect_char('(')?;
        let trend_strength = self.parse_source()?;
        self.expect_char(',')?;
        let volatility = self.parse_source()?;
        self.expect_char(',')?;
        let trend_threshold = self.parse_number()?;
        self.expect_char(',')?;
        let window = self.parse_count("window")?;
        self.expect_char(',')?;
        let volatility_factor = self.parse_number()?;
        self.expect_char(')')?;
        Ok(FeatureKind::Regime {
            trend_strength,
            volatility,
            trend_threshold,
            window,
            volatility_factor,
        })
    }

    fn parse_feature_kind(&mut self) -> Result<FeatureKind, ParseError> {
        self.skip_whitespace();
        let word = self.peek_word();
        let kind = match word.as_str() {
            "SMA" | "EMA" | "RSI" | "STDDEV" | "VOLATILITY" | "MAX" | "MIN" | "PCT_CHANGE" => {
                self.pos += word.len();
                let make: fn(usize) -> IndicatorType = match word.as_str() {
                    "SMA" => IndicatorType::Sma,
                    "EMA" => IndicatorType::Ema,
                    "RSI" => IndicatorType::Rsi,
                    "STDDEV" => IndicatorType::Stddev,
                    "VOLATILITY" => IndicatorType::Volatility,
                    "MAX" => IndicatorType::RollingMax,
                    "MIN" => IndicatorType::RollingMin,
                    _ => IndicatorType::PctChange,
                };
                self.parse_windowed(make)?
            }
            "ATR" | "NATR" | "ADX" => {
                self.pos += word.len();
                let make: fn(usize) -> IndicatorType = match word.as_str() {
                    "ATR" => IndicatorType::Atr,
                    "NATR" => IndicatorType::Natr,
                    _ => IndicatorType::Adx,
                };
                self.parse_candle_indicator(make)?
            }
            "MACD_LINE" | "MACD_SIGNAL" | "MACD_HISTOGRAM" => {
                self.pos += word.len();
                let field = match word.as_str() {
                    "MACD_LINE" => IndicatorField::MacdLine,
                    "MACD_SIGNAL" => IndicatorField::MacdSignal,
                    _ => IndicatorField::MacdHistogram,
                };
                self.parse_macd(field)?
            }
            "BOLLINGER_UPPER" | "BOLLINGER_MIDDLE" | "BOLLINGER_LOWER" => {
                self.pos += word.len();
                let field = match word.as_str() {
                    "BOLLINGER_UPPER" => IndicatorField::BollingerUpper,
                    "BOLLINGER_MIDDLE" => IndicatorField::BollingerMiddle,
                    _ => IndicatorField::BollingerLower,
                };
                self.parse_bollinger(field)?
            }
            "SAR" => {
                self.pos += word.len();
                self.parse_sar()?
            }
            "VWAP" => {
                self.pos += word.len();
                self.parse_vwap()?
            }
            "RATIO" => {
                self.pos += word.len();
                let [numerator, denominator] = self.parse_sources::<2>()?;
                FeatureKind::Ratio {
                    numerator,
                    denominator,
                }
            }
            "SPREAD" | "ABS_SPREAD" => {
                self.pos += word.len();
                self.parse_spread(word == "ABS_SPREAD")?
            }
            "CHANGE" | "LAG" => {
                self.pos += word.len();
                self.parse_shift(word == "LAG")?
            }
            "POSITION" => {
                self.pos += word.len();
                let [value, lower, upper] = self.parse_sources::<3>()?;
                FeatureKind::Position {
                    value,
                    lower,
                    upper,
                }
            }
            "REGIME" => {
                self.pos += word.len();
                self.parse_regime_feature()?
            }
            _ => return Err(self.error(format!("expected feature, found '{}'", word))),
        };
        self.expect_end("feature")?;
        Ok(kind)
    }
}

/// Parse a rule expression such as `AND(ABOVE(rsi, 50), CROSS_ABOVE(ema_9, ema_21))`.
pub fn parse(input: &str) -> Result<Rule, ParseError> {
    let mut parser = Parser::new(input);
    parser.parse()
}

/// Parse a leverage trigger such as `ANY(REGIME(regime, VOLATILE), FEATURE_ABOVE(natr, 0.03))`.
pub fn parse_trigger(input: &str) -> Result<Trigger, ParseError> {
    let mut parser = Parser::new(input);
    let trigger = parser.parse_trigger()?;
    parser.expect_end("trigger")?;
    Ok(trigger)
}

/// Parse a feature expression such as `EMA(close, 9)` into a named spec.
pub fn parse_feature(name: &str, input: &str) -> Result<FeatureSpec, ParseError> {
    let mut parser = Parser::new(input);
    let kind = parser.parse_feature_kind()?;
    Ok(FeatureSpec::new(name, kind))
}
