use std::io;
use std::path::Path;

use serde::Serialize;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleImage {
    pub low_res_url: String,
    pub full_res_url: String,
}

/// 列出示例图片目录下的文件，`lowres/` 中有同名缩略图时使用缩略图地址
pub async fn load_sample_images(folder: &Path) -> io::Result<Vec<SampleImage>> {
    let mut entries = match fs::read_dir(folder).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let lowres_folder = folder.join("lowres");
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let mut samples = Vec::with_capacity(names.len());
    for name in names {
        let low_res_url = if fs::try_exists(lowres_folder.join(&name)).await? {
            format!("sampleimgs/lowres/{}", name)
        } else {
            format!("sampleimgs/{}", name)
        };
        samples.push(SampleImage {
            low_res_url,
            full_res_url: format!("sampleimgs/{}", name),
        });
    }

    Ok(samples)
}
