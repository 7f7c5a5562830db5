//! Chumsky grammar for the path-expression dialect.

use super::Segment;
use chumsky::error::Rich;
use chumsky::prelude::*;
use std::str::FromStr;

/// Parser for a full path expression: `$` followed by any number of
/// segments, consuming the whole input.
pub(super) fn parser<'src>()
-> impl Parser<'src, &'src str, Vec<Segment>, extra::Err<Rich<'src, char>>> {
    // Bare member names: letters, digits, '_' and '-'. Anything else goes
    // through the quoted form.
    let ident = any()
        .filter(|c: &char| c.is_alphanumeric() || *c == '_' || *c == '-')
        .repeated()
        .at_least(1)
        .collect::<String>();

    // `..name` — recursive descent. Must be tried before plain member
    // access so the second dot is not taken as an empty member.
    let recursive = just("..")
        .ignore_then(ident.clone())
        .map(Segment::Recursive);

    // `.name`
    let member = just('.').ignore_then(ident.clone()).map(Segment::Field);

    // `['name']` — members whose name the bare grammar cannot carry.
    let quoted = just("['")
        .ignore_then(none_of("'").repeated().collect::<String>())
        .then_ignore(just("']"))
        .map(Segment::Field);

    // `[*]`
    let wildcard = just("[*]").to(Segment::Wildcard);

    // `[n]`, negative counts from the end.
    let index = just('[')
        .ignore_then(
            just('-')
                .or_not()
                .then(
                    any()
                        .filter(|c: &char| c.is_ascii_digit())
                        .repeated()
                        .at_least(1)
                        .collect::<String>(),
                )
                .try_map(|(sign, digits), span| {
                    let rendered = match sign {
                        Some(_) => format!("-{}", digits),
                        None => digits,
                    };
                    i64::from_str(&rendered)
                        .map_err(|_| Rich::custom(span, format!("invalid index: {}", rendered)))
                }),
        )
        .then_ignore(just(']'))
        .map(Segment::Index);

    let segment = choice((recursive, member, quoted, wildcard, index));

    just('$')
        .ignore_then(segment.repeated().collect::<Vec<_>>())
        .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<Segment> {
        parser().parse(input).into_result().unwrap()
    }

    #[test]
    fn parses_segment_kinds() {
        assert_eq!(
            parse("$.a..b[0][*]['c d']"),
            vec![
                Segment::Field("a".into()),
                Segment::Recursive("b".into()),
                Segment::Index(0),
                Segment::Wildcard,
                Segment::Field("c d".into()),
            ]
        );
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parser().parse("$.a!").into_result().is_err());
        assert!(parser().parse("$.").into_result().is_err());
    }
}
