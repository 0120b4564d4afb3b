//! Shell text handling for rule evaluation.
//!
//! Commands are split on control operators outside quotes. Each segment keeps
//! its raw text (used to build corrected actions) and a quote-stripped view
//! (used for pattern matching, so prose that merely mentions a pattern does
//! not trigger it). Write-target resolution reports which files a command
//! writes, following `cd` between segments.

use std::path::{Component, Path, PathBuf};

/// One control-operator-delimited piece of a composite command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Raw text, trimmed.
    pub raw: String,
    /// Raw text with quoted literal content removed (quotes kept as `''`).
    pub stripped: String,
    /// Operator that followed this segment in the original command.
    pub separator: Option<String>,
    /// True when the segment came from an inline script (`bash -c '...'`) or
    /// a command substitution.
    pub nested: bool,
}

impl Segment {
    /// Words of the raw segment with quotes removed, minus grouping syntax,
    /// leading env assignments, and transparent wrappers (`sudo -u root`,
    /// `xargs -n 1`, ...).
    pub fn argv(&self) -> Vec<String> {
        let mut words = words(&self.raw);
        trim_group_closers(&mut words);
        let mut start = 0;
        while start < words.len() {
            let word = &mut words[start];
            if !word.first_quoted && word.text.len() > 1 && word.text.starts_with('(') {
                word.text = word.text.trim_start_matches('(').to_string();
            }
            let text = word.text.as_str();
            let bare = !word.first_quoted && !word.last_quoted;
            if (bare && GROUPING_WORDS.contains(&text)) || is_env_assignment(text) {
                start += 1;
                continue;
            }
            if let Some((_, value_flags)) = WRAPPERS.iter().find(|(name, _)| *name == text) {
                let takes_operand = text == "timeout";
                start = skip_options(&words, start + 1, value_flags);
                if takes_operand {
                    start += 1;
                }
                continue;
            }
            break;
        }
        words
            .into_iter()
            .skip(start)
            .map(|word| word.text)
            .collect()
    }
}

/// Reserved words and grouping tokens that may precede a command.
const GROUPING_WORDS: [&str; 14] = [
    "(", ")", "{", "}", "!", "if", "then", "do", "else", "elif", "while", "until", "fi", "done",
];

/// Commands that run their operands as a command, with the options that take
/// a separate value word.
const WRAPPERS: [(&str, &[&str]); 12] = [
    ("sudo", &["-u", "-g", "-C", "-D", "-h", "-p", "-r", "-t", "-T", "-U"]),
    ("doas", &["-u", "-C"]),
    ("env", &["-u", "-C"]),
    ("time", &["-f", "-o"]),
    ("nohup", &[]),
    ("command", &[]),
    ("exec", &["-a"]),
    ("nice", &["-n"]),
    ("ionice", &["-c", "-n", "-p"]),
    ("stdbuf", &["-i", "-o", "-e"]),
    ("timeout", &["-s", "-k"]),
    ("xargs", &["-a", "-d", "-E", "-I", "-L", "-n", "-P", "-s"]),
];

const SHELLS: [&str; 5] = ["sh", "bash", "zsh", "dash", "ksh"];
const MAX_INLINE_DEPTH: usize = 3;

fn skip_options(words: &[Word], mut idx: usize, value_flags: &[&str]) -> usize {
    while let Some(word) = words.get(idx) {
        let text = word.text.as_str();
        if text == "--" {
            return idx + 1;
        }
        if !text.starts_with('-') {
            break;
        }
        idx += if value_flags.contains(&text) { 2 } else { 1 };
    }
    idx
}

/// Drop `)` / `}` tokens and unbalanced trailing parens left by a subshell
/// or brace group, so `(rm -rf /)` reads as `rm -rf /`.
fn trim_group_closers(words: &mut Vec<Word>) {
    while let Some(last) = words.last_mut() {
        if last.last_quoted {
            break;
        }
        if matches!(last.text.as_str(), ")" | "}" | ";;") {
            words.pop();
            continue;
        }
        let opens = last.text.matches('(').count();
        let closes = last.text.matches(')').count();
        if closes > opens && last.text.ends_with(')') {
            last.text.pop();
            continue;
        }
        break;
    }
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

/// Split a command into segments on `&&`, `||`, `;`, `|`, `&`, and newlines
/// outside quotes.
pub fn split_composite(command: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                current.push(c);
            }
            None => match c {
                '\\' => {
                    escaped = true;
                    current.push(c);
                }
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '&' | '|' => {
                    let doubled = chars.peek() == Some(&c);
                    // `>&2`, `2>&1`, `&>` are redirections, not operators.
                    let is_redirect = c == '&'
                        && (current.ends_with('>') || chars.peek() == Some(&'>'));
                    if is_redirect {
                        current.push(c);
                        continue;
                    }
                    let op = if doubled {
                        chars.next();
                        format!("{c}{c}")
                    } else {
                        c.to_string()
                    };
                    push_segment(&mut segments, &mut current, Some(op));
                }
                ';' | '\n' => push_segment(&mut segments, &mut current, Some(c.to_string())),
                _ => current.push(c),
            },
        }
    }
    push_segment(&mut segments, &mut current, None);
    segments
}

fn push_segment(segments: &mut Vec<Segment>, current: &mut String, separator: Option<String>) {
    let raw = current.trim().to_string();
    current.clear();
    if raw.is_empty() {
        // Attach a dangling operator to the previous segment so the rebuilt
        // command keeps its shape.
        if let (Some(last), Some(sep)) = (segments.last_mut(), separator) {
            if last.separator.is_none() {
                last.separator = Some(sep);
            }
        }
        return;
    }
    segments.push(Segment {
        stripped: strip_quoted(&raw),
        raw,
        separator,
        nested: false,
    });
}

/// Split a command and flatten inline scripts (`bash -c '...'`, `eval '...'`)
/// and command substitutions (`$(...)`, backticks, `<(...)`) into additional
/// nested segments, so quoting cannot hide an executed payload.
pub fn expand_segments(command: &str) -> Vec<Segment> {
    let mut out = Vec::new();
    expand_into(command, 0, false, &mut out);
    out
}

fn expand_into(command: &str, depth: usize, nested: bool, out: &mut Vec<Segment>) {
    for mut segment in split_composite(command) {
        segment.nested = nested;
        let mut payloads: Vec<String> = inline_script(&segment).into_iter().collect();
        payloads.extend(substitutions(&segment.raw));
        out.push(segment);
        if depth < MAX_INLINE_DEPTH {
            for payload in payloads {
                expand_into(&payload, depth + 1, true, out);
            }
        }
    }
}

/// Payload of an inline script invocation, if the segment is one.
pub fn inline_script(segment: &Segment) -> Option<String> {
    let argv = segment.argv();
    let program = argv.first()?.rsplit('/').next()?.to_string();
    if program == "eval" {
        let payload = argv[1..].join(" ");
        return (!payload.is_empty()).then_some(payload);
    }
    if !SHELLS.contains(&program.as_str()) {
        return None;
    }
    let mut iter = argv.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg.starts_with('-') && !arg.starts_with("--") && arg.contains('c') {
            return iter.next().cloned();
        }
        if !arg.starts_with('-') {
            return None;
        }
    }
    None
}

/// Bodies of command and process substitutions outside single quotes.
/// An unterminated body runs to the end of the text.
pub fn substitutions(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut bodies = Vec::new();
    let mut quote: Option<char> = None;
    let mut idx = 0;
    while idx < chars.len() {
        let c = chars[idx];
        if quote == Some('\'') {
            if c == '\'' {
                quote = None;
            }
            idx += 1;
            continue;
        }
        match c {
            '\\' => {
                idx += 2;
                continue;
            }
            '"' if quote == Some('"') => quote = None,
            '\'' | '"' if quote.is_none() => quote = Some(c),
            '`' => {
                let body_start = idx + 1;
                let end = chars[body_start..]
                    .iter()
                    .position(|&d| d == '`')
                    .map_or(chars.len(), |offset| body_start + offset);
                bodies.push(chars[body_start..end].iter().collect());
                idx = end + 1;
                continue;
            }
            '$' | '<' | '>' if chars.get(idx + 1) == Some(&'(') => {
                let body_start = idx + 2;
                let end = closing_paren(&chars, body_start);
                bodies.push(chars[body_start..end].iter().collect());
                idx = end + 1;
                continue;
            }
            _ => {}
        }
        idx += 1;
    }
    bodies
}

/// Index of the `)` closing a paren opened just before `start`.
fn closing_paren(chars: &[char], start: usize) -> usize {
    let mut depth = 1;
    let mut quote: Option<char> = None;
    for (idx, &c) in chars.iter().enumerate().skip(start) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return idx;
                    }
                }
                _ => {}
            },
        }
    }
    chars.len()
}

/// A file a command writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteTarget {
    /// Lexically resolved against the directory the writing segment runs in.
    Path(PathBuf),
    /// Names a variable or substitution, or is relative to a directory that
    /// could not be resolved. Holds the text as written.
    Unresolved(String),
}

/// Files written by `segments` when run from `cwd`.
///
/// Covers output redirections, `tee`, in-place `sed`, `dd of=`, `touch`,
/// `truncate`, and the destination of `cp`/`mv`/`install`/`ln`/`rsync`.
/// A `cd` or `pushd` moves the directory for the segments after it.
pub fn write_targets(segments: &[Segment], cwd: &Path) -> Vec<WriteTarget> {
    let mut dir = Some(cwd.to_path_buf());
    let mut targets = Vec::new();
    for segment in segments {
        let argv = segment.argv();
        let Some(program) = argv.first().map(|word| word.rsplit('/').next().unwrap_or(word))
        else {
            targets.extend(redirect_targets(&segment.raw).into_iter().map(|written| {
                resolve_target(dir.as_deref(), written)
            }));
            continue;
        };
        if matches!(program, "cd" | "pushd") {
            let to = argv[1..].iter().find(|arg| !arg.starts_with('-'));
            dir = match to {
                Some(to) if !is_dynamic(to) && !to.starts_with('~') => {
                    match (dir.as_deref(), Path::new(to).is_absolute()) {
                        (_, true) => Some(normalize(Path::new("/"), Path::new(to))),
                        (Some(base), false) => Some(normalize(base, Path::new(to))),
                        (None, false) => None,
                    }
                }
                _ => None,
            };
            continue;
        }
        let mut written = redirect_targets(&segment.raw);
        written.extend(command_writes(program, &argv[1..]));
        targets.extend(
            written
                .into_iter()
                .map(|text| resolve_target(dir.as_deref(), text)),
        );
    }
    targets
}

fn resolve_target(dir: Option<&Path>, written: String) -> WriteTarget {
    if is_dynamic(&written) {
        return WriteTarget::Unresolved(written);
    }
    let path = Path::new(&written);
    match dir {
        _ if path.is_absolute() => WriteTarget::Path(normalize(Path::new("/"), path)),
        Some(base) => WriteTarget::Path(normalize(base, path)),
        None => WriteTarget::Unresolved(written),
    }
}

fn is_dynamic(text: &str) -> bool {
    text.contains('$') || text.contains('`')
}

const COPY_VALUE_FLAGS: [&str; 6] = ["-t", "-S", "-m", "-o", "-g", "-e"];

/// Operands a file-writing command writes to.
fn command_writes(program: &str, args: &[String]) -> Vec<String> {
    match program {
        "tee" | "touch" => plain_operands(args, &[]),
        "truncate" => plain_operands(args, &["-s", "-r"]),
        "dd" => args
            .iter()
            .filter_map(|arg| arg.strip_prefix("of="))
            .map(str::to_string)
            .collect(),
        "sed" => sed_in_place_files(args),
        "cp" | "mv" | "install" | "ln" | "rsync" => copy_destinations(args),
        _ => Vec::new(),
    }
}

fn sed_in_place_files(args: &[String]) -> Vec<String> {
    let in_place = args.iter().any(|arg| {
        arg.starts_with("--in-place")
            || (arg.starts_with('-') && !arg.starts_with("--") && arg.contains('i'))
    });
    if !in_place {
        return Vec::new();
    }
    let script_flag = args.iter().any(|arg| {
        matches!(arg.as_str(), "-e" | "-f")
            || arg.starts_with("--expression")
            || arg.starts_with("--file")
    });
    let mut files = plain_operands(args, &["-e", "-f", "-l"]);
    if !script_flag && !files.is_empty() {
        files.remove(0);
    }
    files
}

/// The destination, plus `destination/<name>` for each source in case the
/// destination is a directory.
fn copy_destinations(args: &[String]) -> Vec<String> {
    let target_dir = args
        .windows(2)
        .find(|pair| pair[0] == "-t")
        .map(|pair| pair[1].clone())
        .or_else(|| {
            args.iter()
                .find_map(|arg| arg.strip_prefix("--target-directory="))
                .map(str::to_string)
        });
    let mut operands = plain_operands(args, &COPY_VALUE_FLAGS);
    let destination = match target_dir {
        Some(dir) => dir,
        None => match operands.pop() {
            Some(last) => last,
            None => return Vec::new(),
        },
    };
    let mut out = vec![destination.clone()];
    for source in &operands {
        if let Some(name) = Path::new(source).file_name() {
            out.push(format!(
                "{}/{}",
                destination.trim_end_matches('/'),
                name.to_string_lossy()
            ));
        }
    }
    out
}

/// Non-option words, skipping the values of `value_flags` and any
/// redirection words.
fn plain_operands(args: &[String], value_flags: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let redirect = arg.trim_start_matches(|c: char| c.is_ascii_digit() || c == '&');
        let bare_redirect =
            !redirect.is_empty() && redirect.chars().all(|c| matches!(c, '<' | '>' | '|'));
        if value_flags.contains(&arg.as_str()) || bare_redirect {
            iter.next();
            continue;
        }
        if arg.starts_with('-') || redirect.starts_with(['<', '>']) {
            continue;
        }
        out.push(arg.clone());
    }
    out
}

/// Targets of output redirections (`>`, `>>`, `>|`, `&>`) outside quotes.
/// Descriptor duplication (`2>&1`) and process substitution are skipped.
pub fn redirect_targets(raw: &str) -> Vec<String> {
    let chars: Vec<char> = raw.chars().collect();
    let mut targets = Vec::new();
    let mut quote: Option<char> = None;
    let mut idx = 0;
    while idx < chars.len() {
        let c = chars[idx];
        if let Some(q) = quote {
            if c == '\\' && q == '"' {
                idx += 1;
            } else if c == q {
                quote = None;
            }
            idx += 1;
            continue;
        }
        match c {
            '\\' => idx += 2,
            '\'' | '"' => {
                quote = Some(c);
                idx += 1;
            }
            '>' => {
                idx += 1;
                if matches!(chars.get(idx), Some('>' | '|')) {
                    idx += 1;
                }
                match chars.get(idx) {
                    Some('(') => continue,
                    Some('&') => {
                        idx += 1;
                        if chars
                            .get(idx)
                            .is_some_and(|next| next.is_ascii_digit() || *next == '-')
                        {
                            continue;
                        }
                    }
                    _ => {}
                }
                while chars.get(idx).is_some_and(|next| next.is_whitespace()) {
                    idx += 1;
                }
                let (word, next) = read_word(&chars, idx);
                if !word.is_empty() {
                    targets.push(word);
                }
                idx = next;
            }
            _ => idx += 1,
        }
    }
    targets
}

/// One unquoted shell word starting at `idx`, and the index after it.
fn read_word(chars: &[char], mut idx: usize) -> (String, usize) {
    let mut word = String::new();
    let mut quote: Option<char> = None;
    while let Some(&c) = chars.get(idx) {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => word.push(c),
            None => match c {
                '\'' | '"' => quote = Some(c),
                '\\' => {
                    idx += 1;
                    if let Some(&escaped) = chars.get(idx) {
                        word.push(escaped);
                    }
                }
                c if c.is_whitespace() || "<>|;&()".contains(c) => break,
                _ => word.push(c),
            },
        }
        idx += 1;
    }
    (word, idx)
}

/// Lexically resolve `path` against `base` (no filesystem access).
pub fn normalize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Rebuild a command from segments, joining with their original separators.
///
/// Nested segments are skipped: they are views into a parent segment's text.
pub fn join_segments(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments.iter().filter(|s| !s.nested) {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push(' ');
        }
        out.push_str(&segment.raw);
        match segment.separator.as_deref() {
            Some("\n") => out.push('\n'),
            Some(";") => out.push(';'),
            Some(sep) => {
                out.push(' ');
                out.push_str(sep);
            }
            None => {}
        }
    }
    out.trim_end().to_string()
}

/// Remove quoted literal content, leaving empty quote pairs in its place.
pub fn strip_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            if quote.is_none() {
                out.push(c);
            }
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    out.push(q);
                    quote = None;
                }
            }
            None => match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '\'' | '"' => {
                    out.push(c);
                    quote = Some(c);
                }
                _ => out.push(c),
            },
        }
    }
    if let Some(q) = quote {
        // Unterminated quote: close it so the stripped view stays balanced.
        out.push(q);
    }
    out
}

/// Replace (or with `to = None`, remove) every whole word equal to `from`
/// that appears outside quotes. Quoted text is left untouched.
pub fn replace_word_outside_quotes(raw: &str, from: &str, to: Option<&str>) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut word = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut word_quoted = false;

    let flush = |word: &mut String, quoted: bool, out: &mut String| {
        if !quoted && word == from {
            match to {
                Some(replacement) => out.push_str(replacement),
                None => {
                    // Drop the word and the whitespace that preceded it.
                    while out.ends_with(' ') || out.ends_with('\t') {
                        out.pop();
                    }
                }
            }
        } else {
            out.push_str(word);
        }
        word.clear();
    };

    for c in raw.chars() {
        if escaped {
            word.push(c);
            escaped = false;
            continue;
        }
        match quote {
            Some(q) => {
                if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                word.push(c);
            }
            None => match c {
                '\\' => {
                    escaped = true;
                    word.push(c);
                }
                '\'' | '"' => {
                    quote = Some(c);
                    word_quoted = true;
                    word.push(c);
                }
                c if c.is_whitespace() => {
                    flush(&mut word, word_quoted, &mut out);
                    word_quoted = false;
                    out.push(c);
                }
                _ => word.push(c),
            },
        }
    }
    flush(&mut word, word_quoted, &mut out);
    out.trim().to_string()
}

/// Split text into shell words, removing quotes but keeping quoted content.
pub fn tokenize(text: &str) -> Vec<String> {
    words(text).into_iter().map(|word| word.text).collect()
}

/// A shell word with quotes removed.
#[derive(Debug, Clone, Default)]
struct Word {
    text: String,
    /// The first character came from a quote or an escape.
    first_quoted: bool,
    /// The last character came from a quote or an escape.
    last_quoted: bool,
}

impl Word {
    fn push(&mut self, c: char, quoted: bool) {
        if self.text.is_empty() {
            self.first_quoted = quoted;
        }
        self.last_quoted = quoted;
        self.text.push(c);
    }
}

fn words(text: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current = Word::default();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        if escaped {
            current.push(c, true);
            escaped = false;
            in_word = true;
            continue;
        }
        match quote {
            Some(q) => {
                if c == '\\' && q == '"' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                } else {
                    current.push(c, true);
                }
            }
            None => match c {
                '\\' => escaped = true,
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c, false);
                    in_word = true;
                }
            },
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
