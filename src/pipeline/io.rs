use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::analysis::pca::Embedding;

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.tmp", name))
}

/// Writes through `fill` into a sibling temp file and renames it over `path`,
/// so readers never see a half-written artifact.
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = temp_path(path);
    let result = (|| {
        let file = File::create(&tmp)
            .with_context(|| format!("cannot create {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        fill(&mut writer)?;
        writer.flush()?;
        fs::rename(&tmp, path).with_context(|| format!("cannot move into {}", path.display()))
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("malformed JSON in {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, |w| {
        serde_json::to_writer_pretty(w, value)?;
        Ok(())
    })
}

/// One row per batch entry: `index,cluster,selected,pc1..pcN`.
pub fn write_embedding_csv(
    path: &Path,
    embedding: &Embedding,
    labels: &[usize],
    selected: &[usize],
) -> Result<()> {
    write_atomic(path, |w| {
        let mut csv = csv::Writer::from_writer(w);
        let n_comp = embedding.coords.ncols();

        let mut header = vec!["index".to_string(), "cluster".to_string(), "selected".to_string()];
        header.extend((1..=n_comp).map(|c| format!("pc{}", c)));
        csv.write_record(&header)?;

        for i in 0..embedding.coords.nrows() {
            let mut record = vec![
                i.to_string(),
                labels.get(i).map(|l| l.to_string()).unwrap_or_default(),
                selected.contains(&i).to_string(),
            ];
            record.extend((0..n_comp).map(|c| format!("{:.8}", embedding.coords[(i, c)])));
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    })
}
