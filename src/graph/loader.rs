use super::CsrGraph;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Parses a whitespace-separated edge list into a [`CsrGraph`].
///
/// One `src dst [weight]` triple per line, `weight` defaulting to 1; lines
/// starting with `#` or `%` are comments. Vertex ids are zero-based and the
/// vertex count is `max id + 1`. Edge weights must fit an unsigned 32-bit
/// integer.
///
/// The file is expected to describe a symmetric graph without duplicate
/// edges; neither property is verified here.
pub fn from_file<P: AsRef<Path>>(
    path: P,
    threads: Option<usize>,
) -> Result<CsrGraph, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| -> Box<dyn std::error::Error> {
            format!("error opening graph file {:?}: {e}", path).into()
        })?;

    let mut edge_list: Vec<(usize, usize, u64)> = Vec::new();
    let mut max_id = None::<usize>;

    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (src, dst) = match (fields.next(), fields.next()) {
            (Some(s), Some(d)) => (s, d),
            _ => {
                return Err(format!(
                    "error malformed line {} in {:?}: expected `src dst [weight]`",
                    line_no + 1,
                    path
                )
                .into());
            }
        };
        let src: usize = src.parse().map_err(|_| -> Box<dyn std::error::Error> {
            format!("error invalid vertex id {src:?} at line {}", line_no + 1).into()
        })?;
        let dst: usize = dst.parse().map_err(|_| -> Box<dyn std::error::Error> {
            format!("error invalid vertex id {dst:?} at line {}", line_no + 1).into()
        })?;
        let weight: u32 = match fields.next() {
            Some(w) => w.parse().map_err(|_| -> Box<dyn std::error::Error> {
                format!("error invalid edge weight {w:?} at line {}", line_no + 1).into()
            })?,
            None => 1,
        };
        max_id = Some(max_id.map_or(src.max(dst), |m| m.max(src).max(dst)));
        edge_list.push((src, dst, weight as u64));
    }

    let node_count = max_id.map_or(0, |m| m + 1);
    CsrGraph::from_edges(node_count, &edge_list, threads)
}

#[cfg(test)]
mod test {
    use super::*;

    use std::io::Write;

    fn write_tmp(name: &str, contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("louvx_loader_{name}_{}", std::process::id()));
        let mut f = File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_weighted_edge_list() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_tmp(
            "ok",
            "# a triangle, both directions per edge\n\
             0 1 2\n1 0 2\n1 2 1\n2 1 1\n0 2 1\n2 0 1\n",
        );
        let g = from_file(&path, Some(1))?;
        std::fs::remove_file(&path)?;
        assert_eq!(g.size(), 3);
        assert_eq!(g.width(), 6);
        assert_eq!(g.vertex_weight(0), 3);
        assert_eq!(g.vertex_weight(1), 3);
        Ok(())
    }

    #[test]
    fn default_weight_is_one() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_tmp("unweighted", "0 1\n1 0\n");
        let g = from_file(&path, Some(1))?;
        std::fs::remove_file(&path)?;
        assert_eq!(g.vertex_weight(0), 1);
        Ok(())
    }

    #[test]
    fn rejects_malformed_lines() {
        let path = write_tmp("bad", "0\n");
        let res = from_file(&path, Some(1));
        std::fs::remove_file(&path).unwrap();
        assert!(res.is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(from_file("/definitely/not/here.el", Some(1)).is_err());
    }
}
