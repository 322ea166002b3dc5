//! Path canonicalization.

/// Lexically canonicalize a path, removing redundant components.
/// Does not access the disk, but only simplifies things like
/// "foo/./bar" => "foo/bar".
/// These paths can show up due to variable expansion in particular, and two
/// spellings of one path must map to the same artifact.
pub fn canon_path_in_place(path: &mut String) {
    if path.is_empty() {
        return;
    }
    let absolute = path.starts_with('/');
    let trailing_slash = path.len() > 1 && path.ends_with('/');

    *path = canon_components(path, absolute, trailing_slash);
}

fn canon_components(path: &str, absolute: bool, trailing_slash: bool) -> String {
    // Components of the result; ".." only stays when there is nothing left to pop.
    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => match components.last() {
                Some(&last) if last != ".." => {
                    components.pop();
                }
                _ => {
                    if !absolute {
                        components.push("..");
                    }
                }
            },
            c => components.push(c),
        }
    }

    let mut canon = String::with_capacity(path.len());
    if absolute {
        canon.push('/');
    }
    canon.push_str(&components.join("/"));
    if trailing_slash && !components.is_empty() {
        canon.push('/');
    }
    if canon.is_empty() {
        canon.push('.');
    }
    canon
}

pub fn canon_path<T: Into<String>>(inpath: T) -> String {
    let mut path: String = inpath.into();
    canon_path_in_place(&mut path);
    path
}
