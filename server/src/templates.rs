//! Inline HTML for the upload form and result page. The page subscribes to
//! `/logs` with an EventSource so progress messages show up live.

pub struct PipelineResult {
    pub caption: String,
    pub audio_filename: String,
}

pub fn index_page(result: Option<&PipelineResult>) -> String {
    let result_block = match result {
        Some(r) => format!(
            r#"    <section class="result">
      <h2>Caption</h2>
      <p id="caption">{caption}</p>
      <audio controls autoplay src="/get_audio/{audio}"></audio>
    </section>
"#,
            caption = escape_html(&r.caption),
            audio = escape_html(&r.audio_filename),
        ),
        None => String::new(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Image Caption to Speech</title>
</head>
<body>
  <main>
    <h1>Image Caption to Speech</h1>
    <form method="post" action="/" enctype="multipart/form-data">
      <input type="file" name="imagefile" accept="image/*">
      <button type="submit">Caption it</button>
    </form>
{result_block}    <section>
      <h2>Logs</h2>
      <pre id="logs"></pre>
    </section>
  </main>
  <script>
    const logs = document.getElementById("logs");
    const source = new EventSource("/logs");
    source.onmessage = (e) => {{
      logs.textContent += e.data + "\n";
    }};
  </script>
</body>
</html>
"#
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
