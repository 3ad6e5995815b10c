use anyhow::{anyhow, Context, Result};
use reelsearch_core::{DocId, Document};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Ids arrive as numbers or numeric strings depending on the export.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Num(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct InputMovie {
    id: RawId,
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputFile {
    Wrapped { movies: Vec<InputMovie> },
    Bare(Vec<InputMovie>),
}

fn to_doc_id(raw: &RawId) -> Result<DocId> {
    let n = match raw {
        RawId::Num(n) => *n,
        RawId::Text(s) => s.trim().parse::<u64>().with_context(|| format!("movie id {s:?} is not an integer"))?,
    };
    if n == 0 {
        return Err(anyhow!("movie id must be positive"));
    }
    DocId::try_from(n).map_err(|_| anyhow!("movie id {n} does not fit a document id"))
}

/// Load movies from a `movies.json` file or every `.json` file under a
/// directory, sorted by id.
pub fn load_documents(input: &Path) -> Result<Vec<Document>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && p.extension().and_then(|s| s.to_str()) == Some("json") {
                files.push(p.to_path_buf());
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        return Err(anyhow!("input {} does not exist", input.display()));
    }

    let mut docs = Vec::new();
    for file in files {
        let reader = BufReader::new(File::open(&file).with_context(|| format!("opening {}", file.display()))?);
        let parsed: InputFile =
            serde_json::from_reader(reader).with_context(|| format!("parsing {}", file.display()))?;
        let movies = match parsed {
            InputFile::Wrapped { movies } => movies,
            InputFile::Bare(movies) => movies,
        };
        for m in movies {
            docs.push(Document { id: to_doc_id(&m.id)?, title: m.title, description: m.description });
        }
    }
    docs.sort_by_key(|d| d.id);
    tracing::info!(num_docs = docs.len(), input = %input.display(), "loaded documents");
    Ok(docs)
}
