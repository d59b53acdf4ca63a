use crate::errors::*;
use glob::Pattern;

/// Turns a dash-separated configuration name, target triplet or pattern into
/// path components. `**` is expanded to `*/**/*` so that `foo**` also
/// matches `foo-bar`. Bracket expressions are copied verbatim.
pub fn dash_components_to_path(s: &str) -> Vec<String> {
    let mut r = String::new();
    let mut stars = 0;
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c == '*' {
            match stars {
                0 => r.push('*'),
                1 => r.push_str("/**/*"),
                _ => (),
            }
            stars += 1;
            continue;
        }
        stars = 0;

        match c {
            '-' => r.push('/'),
            '[' => {
                r.push('[');
                for c in chars.by_ref() {
                    r.push(c);
                    if c == ']' {
                        break;
                    }
                }
            }
            c => r.push(c),
        }
    }

    r.split('/')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

/// Matches path components against pattern components.
///
/// `**` matches zero or more components, a lone `*` may also match an absent
/// component and a trailing `*` in the last pattern component absorbs all
/// remaining components. Fails on malformed patterns.
pub fn path_match<P: AsRef<str>, Q: AsRef<str>>(path: &[P], pattern: &[Q]) -> Result<bool> {
    let path = path.iter().map(|c| c.as_ref()).collect::<Vec<_>>();
    let pattern = pattern
        .iter()
        .map(|c| PatternComponent::compile(c.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(match_components(&path, &pattern))
}

fn match_components(path: &[&str], pattern: &[PatternComponent]) -> bool {
    let Some((first, rest)) = pattern.split_first() else {
        return path.is_empty();
    };

    let PatternComponent::Glob(glob) = first else {
        return (0..=path.len()).any(|skip| match_components(&path[skip..], rest));
    };

    if glob.as_str() == "*" && match_components(path, rest) {
        return true;
    }

    let Some((component, path_rest)) = path.split_first() else {
        return false;
    };

    if !glob.matches(component) {
        return false;
    }

    if rest.is_empty() && glob.as_str().ends_with('*') {
        return true;
    }

    match_components(path_rest, rest)
}

#[derive(Debug)]
enum PatternComponent {
    Recursive,
    Glob(Pattern),
}

impl PatternComponent {
    fn compile(pattern: &str) -> Result<PatternComponent> {
        if pattern == "**" {
            return Ok(PatternComponent::Recursive);
        }
        let glob = Pattern::new(pattern)
            .with_context(|| anyhow!("Invalid pattern component: {:?}", pattern))?;
        Ok(PatternComponent::Glob(glob))
    }
}
