use std::{
    fs::File,
    io::{BufRead, BufReader, Read, Write},
    path::Path,
};

use crate::cnf::{Clause, Cnf, CnfError, Lit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    max_var: u32,
    num_clauses: usize,
}

impl TryFrom<&str> for Header {
    type Error = CnfError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();
        if tokens.len() != 4 || tokens[0] != "p" || tokens[1] != "cnf" {
            return Err(CnfError::MalformedHeader(line.trim().to_string()));
        }
        let max_var = tokens[2]
            .parse::<u32>()
            .map_err(|_| CnfError::MalformedHeader(line.trim().to_string()))?;
        let num_clauses = tokens[3]
            .parse::<usize>()
            .map_err(|_| CnfError::MalformedHeader(line.trim().to_string()))?;
        Ok(Header {
            max_var,
            num_clauses,
        })
    }
}

impl Cnf {
    /// Parses DIMACS text.
    ///
    /// Lines starting with `c` are comments. Exactly one `p cnf <max_var> <num_clauses>`
    /// header must precede the clauses, and the number of clauses must match it.
    pub fn from_dimacs(reader: impl Read) -> Result<Cnf, CnfError> {
        let reader = BufReader::new(reader);
        let mut header: Option<Header> = None;
        let mut cnf = Cnf::new();
        let mut current = Clause::new();

        for line in reader.lines() {
            let line = line.map_err(|e| CnfError::IoError(e.to_string()))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('c') {
                continue;
            }
            if trimmed.starts_with('p') {
                if header.is_some() {
                    return Err(CnfError::MalformedHeader(
                        "second header ".to_string() + trimmed,
                    ));
                }
                header = Some(Header::try_from(trimmed)?);
                continue;
            }
            let h = header.ok_or(CnfError::MissingHeader)?;
            for token in trimmed.split_whitespace() {
                let value = token
                    .parse::<i64>()
                    .map_err(|_| CnfError::InvalidToken(token.to_string()))?;
                if value == 0 {
                    cnf.add_clause(std::mem::take(&mut current));
                } else if value.unsigned_abs() > h.max_var as u64 {
                    return Err(CnfError::LiteralOutOfRange {
                        lit: value,
                        max_var: h.max_var,
                    });
                } else {
                    current.push(Lit::from(value as i32));
                }
            }
        }

        let h = header.ok_or(CnfError::MissingHeader)?;
        if !current.is_empty() {
            return Err(CnfError::Truncated);
        }
        if cnf.len() != h.num_clauses {
            return Err(CnfError::ClauseCountMismatch {
                declared: h.num_clauses,
                found: cnf.len(),
            });
        }
        Ok(cnf)
    }

    /// DIMACS text including the `p cnf` header.
    pub fn to_dimacs(&self) -> String {
        format!("p cnf {} {}\n{}", self.max_var(), self.len(), self)
    }

    pub fn read_from_file<P: AsRef<Path>>(path: P) -> Result<Cnf, CnfError> {
        let f = File::open(path.as_ref()).map_err(|e| {
            CnfError::IoError(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Cnf::from_dimacs(f)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CnfError> {
        let io_err = |e: std::io::Error| {
            CnfError::IoError(format!("{}: {}", path.as_ref().display(), e))
        };
        let mut f = File::create(path.as_ref()).map_err(io_err)?;
        f.write_all(self.to_dimacs().as_bytes()).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cnf::cnf;
    use proptest::prelude::*;

    #[test]
    fn header_try_from_test() {
        assert!(Header::try_from("").is_err());
        assert!(Header::try_from("p cnf 3").is_err());
        assert!(Header::try_from("p dnf 3 2").is_err());
        assert!(Header::try_from("p cnf -3 2").is_err());
        assert_eq!(
            Header::try_from("p  cnf 3 2 ").unwrap(),
            Header {
                max_var: 3,
                num_clauses: 2
            }
        );
    }

    #[test]
    fn from_dimacs_test() {
        let text = "c a comment\np cnf 3 2\n1 -2 0\n3\n-1 0\n";
        assert_eq!(
            Cnf::from_dimacs(text.as_bytes()).unwrap(),
            cnf(&[&[1, -2], &[3, -1]])
        );
    }

    #[test]
    fn from_dimacs_errors_test() {
        assert!(matches!(
            Cnf::from_dimacs("1 2 0\n".as_bytes()),
            Err(CnfError::MissingHeader)
        ));
        assert!(matches!(
            Cnf::from_dimacs("p cnf 2 1\n1 2\n".as_bytes()),
            Err(CnfError::Truncated)
        ));
        assert!(matches!(
            Cnf::from_dimacs("p cnf 2 2\n1 2 0\n".as_bytes()),
            Err(CnfError::ClauseCountMismatch {
                declared: 2,
                found: 1
            })
        ));
        assert!(matches!(
            Cnf::from_dimacs("p cnf 2 1\n1 x 0\n".as_bytes()),
            Err(CnfError::InvalidToken(_))
        ));
        assert!(matches!(
            Cnf::from_dimacs("p cnf 2 1\n1 3 0\n".as_bytes()),
            Err(CnfError::LiteralOutOfRange { lit: 3, max_var: 2 })
        ));
    }

    #[test]
    fn to_dimacs_test() {
        let f = cnf(&[&[1, -4], &[2]]);
        assert_eq!(f.to_dimacs(), "p cnf 4 2\n1 -4 0\n2 0\n");
        assert_eq!(f.to_string(), "1 -4 0\n2 0\n");
    }

    proptest! {
        #[test]
        fn dimacs_round_trip_test(clauses in prop::collection::vec(
            prop::collection::vec((1i32..20, any::<bool>()), 1..6), 0..15)) {
            let f = Cnf::from(
                clauses
                    .iter()
                    .map(|c| c.iter().map(|&(v, s)| Lit::from(if s { v } else { -v })).collect())
                    .collect::<Vec<Clause>>(),
            );
            let parsed = Cnf::from_dimacs(f.to_dimacs().as_bytes()).unwrap();
            prop_assert_eq!(parsed, f);
        }
    }
}
