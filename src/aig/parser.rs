use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use crate::aig::{Aig, AigLit, Latch, Result, error::ParserError};

fn read_u64(s: &str) -> std::result::Result<u64, ParserError> {
    s.parse::<u64>()
        .map_err(|_| ParserError::InvalidToken(s.to_string() + " expected u64"))
}

fn check_even(x: u64) -> Result<()> {
    if x & 1 == 1 {
        return Err(ParserError::InvalidToken(
            "expected literal to be even, got ".to_string() + &x.to_string(),
        )
        .into());
    }
    Ok(())
}

/// Reads one line, failing on end of file.
fn next_line(reader: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .map_err(|e| ParserError::IoError(e.to_string()))?;
    if n == 0 {
        return Err(ParserError::InvalidToken("unexpected end of file".to_string()).into());
    }
    Ok(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    m: u64,
    i: u64,
    l: u64,
    o: u64,
    a: u64,
}

impl TryFrom<&str> for Header {
    type Error = ParserError;

    fn try_from(line: &str) -> std::result::Result<Self, Self::Error> {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();

        if tokens.len() < 6 {
            return Err(ParserError::InvalidToken(
                "missing header tokens".to_string(),
            ));
        }

        if tokens[0] != "aag" && tokens[0] != "aig" {
            return Err(ParserError::InvalidToken(
                "expected aag (or at least aig)".to_string(),
            ));
        }

        let m = read_u64(tokens[1])?;
        let i = read_u64(tokens[2])?;
        let l = read_u64(tokens[3])?;
        let o = read_u64(tokens[4])?;
        let a = read_u64(tokens[5])?;

        if tokens.len() > 6 {
            return Err(ParserError::UnsupportedFeature(
                "header only supports M I L O A".to_string(),
            ));
        }

        Ok(Header { m, i, l, o, a })
    }
}

/// Reads the reset value of latch `lit`: 0, 1, or the latch literal itself for "uninitialized".
fn read_reset(token: Option<&str>, lit: AigLit) -> Result<Option<bool>> {
    match token {
        None => Ok(Some(false)),
        Some(t) => {
            let res = read_u64(t)?;
            if res == 0 {
                Ok(Some(false))
            } else if res == 1 {
                Ok(Some(true))
            } else if res == lit {
                Ok(None)
            } else {
                Err(ParserError::InvalidToken(
                    "expected 0 1 or latch literal for latch initialization, got ".to_string() + t,
                )
                .into())
            }
        }
    }
}

fn read_single_lit(line: &str, what: &str) -> Result<AigLit> {
    let tokens = line.split_whitespace().collect::<Vec<&str>>();

    if tokens.is_empty() {
        return Err(
            ParserError::InvalidToken(format!("expected {} token, got nothing", what)).into(),
        );
    }

    if tokens.len() > 1 {
        return Err(ParserError::InvalidToken(format!(
            "expected nothing after {}, got {}",
            what, tokens[1]
        ))
        .into());
    }

    Ok(read_u64(tokens[0])?)
}

fn read_outputs(o: u64, reader: &mut impl BufRead) -> Result<Vec<AigLit>> {
    let mut outputs = Vec::new();
    for _ in 0..o {
        outputs.push(read_single_lit(&next_line(reader)?, "output")?);
    }
    Ok(outputs)
}

/// Parser for the ASCII AIGER format.
mod ascii {
    use std::io::BufRead;

    use crate::aig::{
        AigLit, AndGate, Latch, Result,
        error::ParserError,
        parser::{check_even, next_line, read_reset, read_single_lit, read_u64},
    };

    pub(super) fn read_input(line: &str) -> Result<AigLit> {
        let i = read_single_lit(line, "input")?;
        check_even(i)?;
        Ok(i)
    }

    pub(super) fn read_inputs(i: u64, reader: &mut impl BufRead) -> Result<Vec<AigLit>> {
        let mut inputs = Vec::new();
        for _ in 0..i {
            inputs.push(read_input(&next_line(reader)?)?);
        }
        Ok(inputs)
    }

    pub(super) fn read_latch(line: &str) -> Result<Latch> {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();

        if tokens.len() < 2 {
            return Err(ParserError::InvalidToken("not enough latch tokens".to_string()).into());
        }

        if tokens.len() > 3 {
            return Err(ParserError::InvalidToken(
                "expected nothing after latch, got ".to_string() + tokens[3],
            )
            .into());
        }

        let lit = read_u64(tokens[0])?;
        let next = read_u64(tokens[1])?;
        check_even(lit)?;
        let reset = read_reset(tokens.get(2).copied(), lit)?;
        Ok(Latch { lit, next, reset })
    }

    pub(super) fn read_latches(l: u64, reader: &mut impl BufRead) -> Result<Vec<Latch>> {
        let mut latches = Vec::new();
        for _ in 0..l {
            latches.push(read_latch(&next_line(reader)?)?);
        }
        Ok(latches)
    }

    pub(super) fn read_and(line: &str) -> Result<AndGate> {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();

        if tokens.len() < 3 {
            return Err(ParserError::InvalidToken("not enough and tokens".to_string()).into());
        }

        if tokens.len() > 3 {
            return Err(ParserError::InvalidToken(
                "expected nothing after and tokens, got ".to_string() + tokens[3],
            )
            .into());
        }

        let lhs = read_u64(tokens[0])?;
        let rhs0 = read_u64(tokens[1])?;
        let rhs1 = read_u64(tokens[2])?;
        check_even(lhs)?;
        Ok(AndGate { lhs, rhs0, rhs1 })
    }

    pub(super) fn read_ands(a: u64, reader: &mut impl BufRead) -> Result<Vec<AndGate>> {
        let mut ands = Vec::new();
        for _ in 0..a {
            ands.push(read_and(&next_line(reader)?)?);
        }
        Ok(ands)
    }
}

/// Parser for the binary AIGER format.
mod bin {
    use std::io::{BufRead, Read};

    use crate::aig::{
        AndGate, Latch, Result,
        error::ParserError,
        parser::{Header, next_line, read_reset, read_u64},
    };

    pub(super) fn read_latch(lit: u64, line: &str) -> Result<Latch> {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();

        if tokens.is_empty() {
            return Err(ParserError::InvalidToken("not enough latch tokens".to_string()).into());
        }

        if tokens.len() > 2 {
            return Err(ParserError::InvalidToken(
                "expected nothing after latch, got ".to_string() + tokens[2],
            )
            .into());
        }

        let next = read_u64(tokens[0])?;
        let reset = read_reset(tokens.get(1).copied(), lit)?;
        Ok(Latch { lit, next, reset })
    }

    pub(super) fn read_latches(header: Header, reader: &mut impl BufRead) -> Result<Vec<Latch>> {
        let mut latches = Vec::new();
        for lvar in 0..header.l {
            let lit = 2 * (header.i + lvar + 1);
            latches.push(read_latch(lit, &next_line(reader)?)?);
        }
        Ok(latches)
    }

    fn getnoneofch(buf: &[u8], offset: &mut usize) -> Result<u8> {
        if *offset >= buf.len() {
            return Err(ParserError::InvalidToken("unexpected end of file".to_string()).into());
        }

        let byte = buf[*offset];
        *offset += 1;
        Ok(byte)
    }

    pub(super) fn decode_delta(buf: &[u8], offset: &mut usize) -> Result<u64> {
        let mut x = 0;
        let mut i = 0;

        loop {
            let ch = getnoneofch(buf, offset)?;
            x |= ((ch & 0x7f) as u64) << (7 * i);
            i += 1;

            if ch & 0x80 == 0 {
                break;
            }
        }
        Ok(x)
    }

    pub(super) fn read_ands(header: Header, reader: &mut impl Read) -> Result<Vec<AndGate>> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| ParserError::IoError(e.to_string()))?;

        let mut offset = 0;
        let mut lhs = 2 * (header.i + header.l + 1);
        let mut ands = Vec::with_capacity(header.a as usize);

        for _ in 0..header.a {
            let delta0 = decode_delta(&buf, &mut offset)?;
            let delta1 = decode_delta(&buf, &mut offset)?;

            let rhs0 = lhs.checked_sub(delta0).ok_or_else(|| {
                ParserError::InvalidToken(format!("invalid delta {} for and {}", delta0, lhs))
            })?;
            let rhs1 = rhs0.checked_sub(delta1).ok_or_else(|| {
                ParserError::InvalidToken(format!("invalid delta {} for and {}", delta1, lhs))
            })?;

            ands.push(AndGate { lhs, rhs0, rhs1 });
            lhs += 2;
        }

        Ok(ands)
    }
}

impl Aig {
    /// Creates an AIG from ASCII AIGER (`.aag`) text.
    ///
    /// Symbol table and comments following the AND gates are ignored.
    pub fn from_ascii(reader: impl Read) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let header = Header::try_from(next_line(&mut reader)?.as_str())?;

        let inputs = ascii::read_inputs(header.i, &mut reader)?;
        let latches = ascii::read_latches(header.l, &mut reader)?;
        let outputs = read_outputs(header.o, &mut reader)?;
        let ands = ascii::read_ands(header.a, &mut reader)?;

        Aig::new(header.m, inputs, latches, outputs, ands)
    }

    /// Creates an AIG from binary AIGER (`.aig`) data.
    pub fn from_bin(reader: impl Read) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        let header = Header::try_from(next_line(&mut reader)?.as_str())?;

        // Inputs are implicit in the binary format
        let inputs = (1..=header.i).map(|i| 2 * i).collect();
        let latches = bin::read_latches(header, &mut reader)?;
        let outputs = read_outputs(header.o, &mut reader)?;
        let ands = bin::read_ands(header, &mut reader)?;

        Aig::new(header.m, inputs, latches, outputs, ands)
    }

    /// Creates an AIG from an .aig (resp .aag) file using bin (resp. ASCII) AIGER format.
    ///
    /// Only the M I L O A header is supported.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = File::open(path.as_ref()).map_err(|z| {
            ParserError::IoError(format!("{}: {}", path.as_ref().display(), z))
        })?;
        match path.as_ref().extension().and_then(|ext| ext.to_str()) {
            Some("aag") => Aig::from_ascii(f),
            Some("aig") => Aig::from_bin(f),
            _ => Err(
                ParserError::IoError("invalid extension, expected .aag or .aig".to_string()).into(),
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::aig::{AndGate, fixtures};

    #[test]
    fn read_u64_test() {
        assert!(read_u64("").is_err());
        assert!(read_u64(" ").is_err());
        assert!(read_u64(" 2").is_err());
        assert!(read_u64("-5").is_err());

        assert_eq!(read_u64("42").unwrap(), 42);
        assert_eq!(read_u64("0").unwrap(), 0);
    }

    #[test]
    fn header_try_from_test() {
        assert!(Header::try_from("").is_err());
        assert!(Header::try_from("aag 0 0 0 0").is_err());
        assert!(Header::try_from("aag 1 1 -1 1 1").is_err());
        assert!(matches!(
            Header::try_from("aag 1 1 0 1 0 1"),
            Err(ParserError::UnsupportedFeature(_))
        ));

        assert_eq!(
            Header::try_from("   aag 7 1 3 3 3 ").unwrap(),
            Header {
                m: 7,
                i: 1,
                l: 3,
                o: 3,
                a: 3
            }
        );
    }

    #[test]
    fn read_input_test() {
        assert!(ascii::read_input("").is_err());
        assert!(ascii::read_input("2 14").is_err());
        assert!(ascii::read_input("3").is_err());
        assert_eq!(ascii::read_input("   42  ").unwrap(), 42);
    }

    #[test]
    fn read_latch_test() {
        assert!(ascii::read_latch("").is_err());
        assert!(ascii::read_latch("3 14").is_err());
        assert!(ascii::read_latch("4 18 2").is_err());

        assert_eq!(
            ascii::read_latch("2 6").unwrap(),
            Latch {
                lit: 2,
                next: 6,
                reset: Some(false)
            }
        );
        assert_eq!(ascii::read_latch("6 1 1").unwrap().reset, Some(true));
        assert_eq!(ascii::read_latch("6 1 6").unwrap().reset, None);
    }

    #[test]
    fn read_and_test() {
        assert!(ascii::read_and("2 14").is_err());
        assert!(ascii::read_and("4 18 2 2").is_err());
        assert!(ascii::read_and("3 2 1").is_err());
        assert_eq!(
            ascii::read_and("   42   5 19   ").unwrap(),
            AndGate {
                lhs: 42,
                rhs0: 5,
                rhs1: 19
            }
        );
    }

    #[test]
    fn decode_delta_test() {
        let buf = [0x02, 0x81, 0x01];
        let mut offset = 0;
        assert_eq!(bin::decode_delta(&buf, &mut offset).unwrap(), 2);
        assert_eq!(bin::decode_delta(&buf, &mut offset).unwrap(), 129);
        assert!(bin::decode_delta(&buf, &mut offset).is_err());
    }

    #[test]
    fn from_ascii_test() {
        let aig = fixtures::parse(fixtures::THREE_BY_THREE);
        assert_eq!(aig.maxvar(), 9);
        assert_eq!(aig.inputs(), &[2, 4, 6]);
        assert_eq!(aig.num_latches(), 3);
        assert_eq!(aig.latches()[1].next, 16);
        assert_eq!(aig.outputs(), &[14, 16, 18, 0]);
        assert_eq!(aig.num_ands(), 3);

        // truncated file
        assert!(Aig::from_ascii("aag 2 1 1 2 0\n2\n4 5\n2\n".as_bytes()).is_err());
    }

    #[test]
    fn from_bin_test() {
        // one input, one latch (next = !input), output the latch, alarm = latch & input
        // and gate 6 = 4 & 2: deltas 2 and 2
        let mut data = b"aig 3 1 1 2 1\n3\n4\n6\n".to_vec();
        data.extend_from_slice(&[0x02, 0x02]);
        let aig = Aig::from_bin(data.as_slice()).unwrap();
        assert_eq!(aig.inputs(), &[2]);
        assert_eq!(aig.latches()[0].lit, 4);
        assert_eq!(aig.latches()[0].next, 3);
        assert_eq!(
            aig.ands()[0],
            AndGate {
                lhs: 6,
                rhs0: 4,
                rhs1: 2
            }
        );
        assert_eq!(aig.alarm(), Some(6));
    }
}
