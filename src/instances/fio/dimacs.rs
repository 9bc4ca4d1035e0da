//! # Parsing and Writing DIMACS WCNF Files
//!
//! The approach is to accept input instances, even if they are not
//! technically in spec, as long as the input is still reasonable.
//!
//! ## References
//!
//! - [DIMACS WCNF pre22](https://maxsat-evaluations.github.io/2017/rules.html#input)
//! - [DIMACS WCNF post22](https://maxsat-evaluations.github.io/2022/rules.html#input)

use std::io::{self, BufRead, Write};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{i32, line_ending, multispace0, multispace1, u64},
    combinator::{all_consuming, map_res, opt, recognize, success},
    error::{Error as NomError, ErrorKind, ParseError},
    multi::separated_list0,
    number::complete::double,
    sequence::{pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use thiserror::Error;

use crate::{
    instances::{MsType, Wcnf, Weight},
    types::{Clause, Lit},
};

/// Errors occurring within the DIMACS parsing module
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid literal in the file
    #[error("invalid literal: {0}")]
    Lit(String),
    /// Invalid ending of a clause
    #[error("invalid clause ending: {0}")]
    ClauseEnding(String),
    /// Invalid weight
    #[error("invalid weight: {0}")]
    Weight(String),
    /// Invalid p line
    #[error("invalid p-line: {0}")]
    PLine(String),
    /// P line value is too large to fit in a [`usize`]
    #[error("value in p-line too large to fit usize: {0}")]
    PValTooLarge(u64),
    /// IO error reading the file
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    /// Base error from nom parsing
    #[error("nom error: {0} ({1:?})")]
    NomError(String, ErrorKind),
    /// Incomplete nom error
    #[error("nom parser requested more data")]
    NomIncomplete,
}

impl ParseError<&str> for Error {
    fn from_error_kind(input: &str, kind: ErrorKind) -> Self {
        Self::NomError(String::from(input), kind)
    }

    fn append(_: &str, _: ErrorKind, other: Self) -> Self {
        // prefer the more meaningful error over a bare NomError
        other
    }
}

fn unwrap_nom_error(err: nom::Err<Error>) -> Error {
    match err {
        nom::Err::Incomplete(_) => Error::NomIncomplete,
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
    }
}

/// Internal type of possible preambles
#[derive(PartialEq, Debug)]
enum Preamble {
    /// `p cnf` header; every clause is hard
    Cnf { n_vars: usize, n_clauses: usize },
    /// `p wcnf` header; a missing top means every weight is soft
    WcnfPre22 {
        n_vars: usize,
        n_clauses: usize,
        top: Option<Weight>,
    },
    /// Post-22 format: no p line, hard clauses prefixed with `h`
    NoPLine { first_line: String },
}

/// Parses a WCNF instance (old or new format) from a reader into `wcnf`
pub(crate) fn parse_wcnf<R: BufRead>(reader: R, wcnf: &mut Wcnf) -> Result<(), Error> {
    let (mut reader, preamble) = parse_preamble(reader)?;
    match preamble {
        Preamble::Cnf { n_vars, n_clauses } => {
            wcnf.set_dimacs_params(n_vars, n_clauses, None);
            loop {
                let mut buf = String::new();
                if reader.read_line(&mut buf)? == 0 {
                    return Ok(());
                }
                let (_, opt_clause) = parse_cnf_line(&buf).map_err(unwrap_nom_error)?;
                if let Some(clause) = opt_clause {
                    wcnf.add_hard(clause);
                }
            }
        }
        Preamble::WcnfPre22 {
            n_vars,
            n_clauses,
            top,
        } => {
            wcnf.set_dimacs_params(n_vars, n_clauses, top);
            loop {
                let mut buf = String::new();
                if reader.read_line(&mut buf)? == 0 {
                    return Ok(());
                }
                let (_, opt_wclause) = parse_wcnf_pre22_line(&buf).map_err(unwrap_nom_error)?;
                if let Some((w, clause)) = opt_wclause {
                    wcnf.add_dimacs_clause(clause, w);
                }
            }
        }
        Preamble::NoPLine { first_line } => {
            let mut buf = first_line;
            loop {
                if !buf.trim().is_empty() {
                    let (_, opt_line) = parse_post22_line(&buf).map_err(unwrap_nom_error)?;
                    match opt_line {
                        Some(Post22Line::Hard(clause)) => wcnf.add_hard(clause),
                        Some(Post22Line::Soft(w, clause)) => wcnf.add_soft(clause, w),
                        None => (),
                    }
                }
                buf.clear();
                if reader.read_line(&mut buf)? == 0 {
                    return Ok(());
                }
            }
        }
    }
}

/// Parses the preamble and determines the file format
fn parse_preamble<R: BufRead>(mut reader: R) -> Result<(R, Preamble), Error> {
    loop {
        let mut buf = String::new();
        if reader.read_line(&mut buf)? == 0 {
            return Ok((
                reader,
                Preamble::NoPLine {
                    first_line: String::new(),
                },
            ));
        }
        if buf.starts_with('c') || buf.trim().is_empty() {
            continue;
        }
        if buf.starts_with('p') {
            let (_, preamble) = parse_p_line(&buf).map_err(unwrap_nom_error)?;
            return Ok((reader, preamble));
        }
        return Ok((reader, Preamble::NoPLine { first_line: buf }));
    }
}

/// Parses a p line and determines the file format
fn parse_p_line(input: &str) -> IResult<&str, Preamble, Error> {
    let full_p_line = String::from(input);
    let (input, _) = terminated::<_, _, _, NomError<_>, _, _>(tag("p"), multispace1)(input)
        .map_err(|e| e.map(|_| Error::PLine(full_p_line.clone())))?;
    let (input, id_token) = alt((
        terminated::<_, _, _, NomError<_>, _, _>(tag("wcnf"), multispace1),
        terminated(tag("cnf"), multispace1),
    ))(input)
    .map_err(|e| e.map(|_| Error::PLine(full_p_line.clone())))?;
    if id_token == "cnf" {
        let (input, (n_vars, _, n_clauses)) =
            tuple::<_, _, NomError<_>, _>((u64, multispace1, u64))(input)
                .map_err(|e| e.map(|_| Error::PLine(full_p_line)))?;
        let n_vars = usize::try_from(n_vars).map_err(|_| nom::Err::Error(Error::PValTooLarge(n_vars)))?;
        let n_clauses =
            usize::try_from(n_clauses).map_err(|_| nom::Err::Error(Error::PValTooLarge(n_clauses)))?;
        return Ok((input, Preamble::Cnf { n_vars, n_clauses }));
    }
    // wcnf; the top is optional, older instances omit it
    let (input, (n_vars, _, n_clauses, top)) =
        tuple::<_, _, NomError<_>, _>((u64, multispace1, u64, opt(preceded(multispace1, double))))(
            input,
        )
        .map_err(|e| e.map(|_| Error::PLine(full_p_line)))?;
    let n_vars = usize::try_from(n_vars).map_err(|_| nom::Err::Error(Error::PValTooLarge(n_vars)))?;
    let n_clauses =
        usize::try_from(n_clauses).map_err(|_| nom::Err::Error(Error::PValTooLarge(n_clauses)))?;
    Ok((
        input,
        Preamble::WcnfPre22 {
            n_vars,
            n_clauses,
            top,
        },
    ))
}

/// Parses a CNF line, either a comment or a clause
fn parse_cnf_line(input: &str) -> IResult<&str, Option<Clause>, Error> {
    let (input, _) = multispace0(input)?;
    if input.trim().is_empty() {
        // tolerate empty lines
        return Ok((input, None));
    }
    match tag::<&str, &str, NomError<&str>>("c")(input) {
        Ok((input, _)) => Ok((input, None)),
        Err(_) => {
            let (input, clause) =
                terminated(separated_list0(multispace1, parse_lit), parse_clause_ending)(input)?;
            Ok((input, Some(Clause::from_iter(clause))))
        }
    }
}

/// Parses a WCNF pre-22 line, either a comment or a weighted clause
fn parse_wcnf_pre22_line(input: &str) -> IResult<&str, Option<(Weight, Clause)>, Error> {
    let (input, _) = multispace0(input)?;
    if input.trim().is_empty() {
        return Ok((input, None));
    }
    match tag::<&str, &str, NomError<&str>>("c")(input) {
        Ok((input, _)) => Ok((input, None)),
        Err(_) => {
            let (input, (weight, opt_clause)) =
                separated_pair(parse_weight, multispace1, parse_cnf_line)(input)?;
            match opt_clause {
                Some(clause) => Ok((input, Some((weight, clause)))),
                None => Err(nom::Err::Error(Error::ClauseEnding(String::from(input)))),
            }
        }
    }
}

/// A non-comment line of a post-22 format file
#[derive(Debug, PartialEq)]
enum Post22Line {
    Hard(Clause),
    Soft(Weight, Clause),
}

/// Parses a WCNF post-22 line, either a comment, a hard, or a soft clause
fn parse_post22_line(input: &str) -> IResult<&str, Option<Post22Line>, Error> {
    let (input, _) = multispace0(input)?;
    if input.trim().is_empty() {
        return Ok((input, None));
    }
    match tag::<&str, &str, NomError<&str>>("c")(input) {
        Ok((input, _)) => Ok((input, None)),
        Err(_) => match terminated(tag::<&str, &str, NomError<&str>>("h"), multispace1)(input) {
            Ok((input, _)) => {
                let (input, opt_clause) = parse_cnf_line(input)?;
                match opt_clause {
                    Some(clause) => Ok((input, Some(Post22Line::Hard(clause)))),
                    None => Err(nom::Err::Error(Error::ClauseEnding(String::from(input)))),
                }
            }
            Err(_) => {
                let (input, (weight, opt_clause)) =
                    separated_pair(parse_weight, multispace1, parse_cnf_line)(input)?;
                match opt_clause {
                    Some(clause) => Ok((input, Some(Post22Line::Soft(weight, clause)))),
                    None => Err(nom::Err::Error(Error::ClauseEnding(String::from(input)))),
                }
            }
        },
    }
}

/// Nuclear parser for a weight value. Negative weights parse here and get
/// rejected with a diagnostic by the addition API.
fn parse_weight(input: &str) -> IResult<&str, Weight, Error> {
    double::<_, NomError<&str>>(input)
        .map_err(|e| e.map(|e: NomError<&str>| Error::Weight(String::from(e.input))))
}

/// Nuclear parser for a literal
fn parse_lit(input: &str) -> IResult<&str, Lit, Error> {
    map_res(i32, Lit::from_ipasir)(input)
        .map_err(|e| e.map(|e: NomError<&str>| Error::Lit(String::from(e.input))))
}

/// Parses the end of a clause. A '0' followed by a linebreak or whitespace,
/// as well as a bare linebreak or end of input, are treated as valid clause
/// endings. This is more lean than the file format spec.
fn parse_clause_ending(input: &str) -> IResult<&str, &str, Error> {
    recognize(pair(
        multispace0,
        alt((
            recognize(all_consuming(success(""))),
            recognize(all_consuming(tag("0"))),
            recognize(terminated(tag("0"), line_ending)),
            recognize(terminated(tag("0"), multispace1)),
            recognize(line_ending),
        )),
    ))(input)
    .map_err(|e| e.map(|e: NomError<&str>| Error::ClauseEnding(String::from(e.input))))
}

/// Writes the simplified instance in pre-22 DIMACS format: optional
/// base-cost encoding pair, soft clauses, unit hards, remaining hards, all
/// in input-file numbering
pub fn write_simplified<W: Write>(writer: &mut W, wcnf: &Wcnf) -> Result<(), io::Error> {
    writeln!(writer, "c simplified wcnf: input file {}", wcnf.file_name())?;
    writeln!(writer, "c max input var: {}", wcnf.n_orig_vars())?;
    if wcnf.is_unsat() {
        writeln!(writer, "c hard clauses are contradictory")?;
        writeln!(writer, "p cnf 1 2")?;
        writeln!(writer, "-1 0")?;
        writeln!(writer, "1 0")?;
        return writer.flush();
    }

    // unit hards live outside the hard store, so the classification alone
    // does not decide whether top-prefixed clauses are needed
    let partial = wcnf.n_hards() > 0 || !wcnf.hard_units.is_empty();
    let weighted = wcnf.ms_type() != MsType::Ms || partial;
    let top = wcnf.total_wt() + 1.0;
    let map_lit = |l: Lit| -> Lit {
        if wcnf.in2ex.is_empty() {
            l
        } else {
            wcnf.map_in2ex(l)
        }
    };

    let mut n_vars = if wcnf.in2ex.is_empty() {
        wcnf.n_vars()
    } else {
        let in_cls = wcnf
            .in2ex
            .iter()
            .flatten()
            .map(|v| v.idx() + 1)
            .max()
            .unwrap_or(0);
        let in_units = wcnf
            .hard_units
            .iter()
            .map(|l| l.vidx() + 1)
            .max()
            .unwrap_or(0);
        in_cls.max(in_units)
    };
    let mut n_cls = wcnf.n_softs() + wcnf.n_hards() + wcnf.hard_units.len();
    if wcnf.base_cost() > 0.0 {
        // base cost becomes a pair of contradictory unit softs
        n_cls += 2;
        if n_vars == 0 {
            n_vars = 1;
        }
    }

    if partial {
        writeln!(writer, "p wcnf {n_vars} {n_cls} {top}")?;
    } else if weighted {
        writeln!(writer, "p wcnf {n_vars} {n_cls}")?;
    } else {
        writeln!(writer, "p cnf {n_vars} {n_cls}")?;
    }

    if wcnf.base_cost() > 0.0 {
        writeln!(writer, "{} 1 0", wcnf.base_cost())?;
        writeln!(writer, "{} -1 0", wcnf.base_cost())?;
    }

    for i in 0..wcnf.n_softs() {
        if weighted {
            write!(writer, "{} ", wcnf.soft_wt(i))?;
        }
        for &l in wcnf.soft(i) {
            write!(writer, "{} ", map_lit(l).to_ipasir())?;
        }
        writeln!(writer, "0")?;
    }

    for &l in &wcnf.hard_units {
        if weighted {
            write!(writer, "{top} ")?;
        }
        writeln!(writer, "{} 0", l.to_ipasir())?;
    }

    for i in 0..wcnf.n_hards() {
        if weighted {
            write!(writer, "{top} ")?;
        }
        for &l in wcnf.hard(i) {
            write!(writer, "{} ", map_lit(l).to_ipasir())?;
        }
        writeln!(writer, "0")?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{parse_p_line, parse_post22_line, parse_wcnf, parse_wcnf_pre22_line, Post22Line, Preamble};
    use crate::{clause, instances::Wcnf, ipasir_lit};

    #[test]
    fn p_line_variants() {
        assert_eq!(
            parse_p_line("p cnf 23 42").unwrap().1,
            Preamble::Cnf {
                n_vars: 23,
                n_clauses: 42
            }
        );
        assert_eq!(
            parse_p_line("p wcnf 23 42 52").unwrap().1,
            Preamble::WcnfPre22 {
                n_vars: 23,
                n_clauses: 42,
                top: Some(52.0)
            }
        );
        assert_eq!(
            parse_p_line("p wcnf 23 42").unwrap().1,
            Preamble::WcnfPre22 {
                n_vars: 23,
                n_clauses: 42,
                top: None
            }
        );
        assert!(parse_p_line("p abc 2 3").is_err());
    }

    #[test]
    fn pre22_line() {
        assert_eq!(parse_wcnf_pre22_line("c test").unwrap().1, None);
        assert_eq!(
            parse_wcnf_pre22_line("42 34 -16 0").unwrap().1,
            Some((42.0, clause![ipasir_lit![34], ipasir_lit![-16]]))
        );
        assert_eq!(
            parse_wcnf_pre22_line("2.5 1 0").unwrap().1,
            Some((2.5, clause![ipasir_lit![1]]))
        );
    }

    #[test]
    fn post22_line() {
        assert_eq!(
            parse_post22_line("h 1 -2 0").unwrap().1,
            Some(Post22Line::Hard(clause![ipasir_lit![1], ipasir_lit![-2]]))
        );
        assert_eq!(
            parse_post22_line("10 -3 0").unwrap().1,
            Some(Post22Line::Soft(10.0, clause![ipasir_lit![-3]]))
        );
    }

    #[test]
    fn parse_pre22_file() {
        let data = "c test\np wcnf 5 3 42\n42 1 2 0\n10 -3 4 5 0\n3 1 0\n";
        let mut wcnf = Wcnf::new();
        parse_wcnf(Cursor::new(data), &mut wcnf).unwrap();
        assert_eq!(wcnf.n_hards(), 1);
        assert_eq!(wcnf.n_softs(), 2);
        assert_eq!(wcnf.hard(0), &[ipasir_lit![1], ipasir_lit![2]]);
        assert_eq!(wcnf.soft_wt(0), 10.0);
        assert_eq!(wcnf.soft_wt(1), 3.0);
        assert_eq!(wcnf.total_cls_wt(), 13.0);
    }

    #[test]
    fn parse_post22_file() {
        let data = "c test\nh 1 2 0\n10 -3 4 5 0\n0 2 0\n";
        let mut wcnf = Wcnf::new();
        parse_wcnf(Cursor::new(data), &mut wcnf).unwrap();
        assert_eq!(wcnf.n_hards(), 1);
        // the zero-weight soft is discarded
        assert_eq!(wcnf.n_softs(), 1);
        assert_eq!(wcnf.total_cls_wt(), 10.0);
    }

    #[test]
    fn parse_empty_soft_becomes_base_cost() {
        let data = "p wcnf 2 2 10\n3 0\n1 1 2 0\n";
        let mut wcnf = Wcnf::new();
        parse_wcnf(Cursor::new(data), &mut wcnf).unwrap();
        assert_eq!(wcnf.n_softs(), 1);
        assert_eq!(wcnf.base_cost(), 3.0);
    }

    #[test]
    fn parse_cnf_file_all_hard() {
        let data = "p cnf 3 2\n1 2 0\n-1 3 0\n";
        let mut wcnf = Wcnf::new();
        parse_wcnf(Cursor::new(data), &mut wcnf).unwrap();
        assert_eq!(wcnf.n_hards(), 2);
        assert_eq!(wcnf.n_softs(), 0);
    }

    #[test]
    fn write_then_parse_round_trip() {
        let mut wcnf = Wcnf::new();
        let mut input = Wcnf::new();
        let data = "p wcnf 3 3 100\n100 1 2 0\n5 -1 0\n7 3 0\n";
        parse_wcnf(Cursor::new(data), &mut wcnf).unwrap();
        wcnf.compute_wt_info();
        let mut out = Vec::new();
        super::write_simplified(&mut out, &wcnf).unwrap();
        parse_wcnf(Cursor::new(out), &mut input).unwrap();
        assert_eq!(input.n_hards(), 1);
        assert_eq!(input.n_softs(), 2);
        assert_eq!(input.total_cls_wt(), 12.0);
    }
}
