// Shell-script stand-ins for ffmpeg / ffprobe used by unit tests.

use std::path::{Path, PathBuf};

/// Write an executable `#!/bin/sh` script named `name` into `dir`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// An ffprobe stand-in that reports the same duration and one audio stream
/// for every file.
#[cfg(unix)]
pub fn fake_ffprobe(dir: &Path, duration: &str) -> PathBuf {
    let json = format!(
        r#"{{"format":{{"duration":"{}","format_name":"mp3","bit_rate":"128000"}},"streams":[{{"codec_type":"audio","codec_name":"mp3","sample_rate":"44100","channels":2}}]}}"#,
        duration
    );
    write_script(dir, "ffprobe", &format!("cat <<'JSON'\n{}\nJSON\n", json))
}

/// An ffmpeg stand-in that appends its arguments to `log` and creates the
/// output file (its last argument).
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, log: &Path) -> PathBuf {
    let body = format!(
        "echo \"$@\" >> '{}'\nfor last; do :; done\ntouch \"$last\"\nexit 0\n",
        log.display()
    );
    write_script(dir, "ffmpeg", &body)
}
