use std::io::Write;

use crate::token::Token;

pub fn print_tokens_string(src: &str, tokens: &[Token]) -> String {
    let mut buf = Vec::with_capacity(tokens.len() * 16);
    print_tokens(&mut buf, src, tokens).expect("writing to a Vec never fails");
    String::from_utf8_lossy(&buf).into_owned()
}

/// Writes one `<KIND, text>` line per token.
pub fn print_tokens(w: &mut impl Write, src: &str, tokens: &[Token]) -> std::io::Result<()> {
    for token in tokens {
        writeln!(w, "<{}, {}>", token.kind.name(), token.text(src))?;
    }
    Ok(())
}
