//! In-page JavaScript evaluated over the debug connection.
//!
//! The feed is queried through the page's own data-testid attributes; these
//! are best-effort and every lookup degrades to an empty value rather than
//! throwing out of the evaluated expression.

/// Probe for the first rendered post carrying text or a permalink.
pub const PROBE_JS: &str = r#"
(() => {
  const posts = document.querySelectorAll('[data-testid="tweet"]');
  const firstText = posts[0]?.querySelector('[data-testid="tweetText"]')?.textContent || '';
  const firstUrl = posts[0]?.querySelector('time')?.closest('a')?.href || '';
  return {
    found: posts.length > 0,
    hasContent: !!(firstText || firstUrl),
    count: posts.length
  };
})()
"#;

/// Extract every currently rendered post. Engagement counters come from the
/// action-bar aria-labels; views from the analytics link, with K/M/B
/// suffixes expanded. An element only counts as a post when it yields at
/// least one of author, permalink, or text.
pub const EXTRACT_JS: &str = r#"
(() => {
  const posts = [];
  const postElements = document.querySelectorAll('[data-testid="tweet"]');

  for (const postEl of postElements) {
    try {
      const textEl = postEl.querySelector('[data-testid="tweetText"]');
      const text = textEl ? textEl.textContent.trim() : '';

      let authorHandle = '';
      let authorName = '';
      const userNameEl = postEl.querySelector('[data-testid="User-Name"]');
      if (userNameEl) {
        const links = userNameEl.querySelectorAll('a');
        for (const link of links) {
          const href = link.getAttribute('href');
          if (href && href.startsWith('/') && !href.includes('/status/')) {
            authorHandle = href.slice(1).split('/')[0];
            break;
          }
        }
        const spans = userNameEl.querySelectorAll('span');
        if (spans.length > 0) {
          authorName = spans[0].textContent.trim();
        }
      }

      const isRepost = !!postEl.querySelector('[data-testid="socialContext"]');

      const getLabelNumber = (el) => {
        if (!el) return 0;
        const label = el.getAttribute('aria-label') || '';
        const match = label.match(/\d+/);
        return match ? parseInt(match[0], 10) : 0;
      };

      const likes = getLabelNumber(postEl.querySelector('[data-testid="like"]'));
      const reposts = getLabelNumber(postEl.querySelector('[data-testid="retweet"]'));
      const replies = getLabelNumber(postEl.querySelector('[data-testid="reply"]'));

      let views = 0;
      const actionBar = postEl.querySelector('[role="group"]');
      if (actionBar) {
        const allLinks = actionBar.querySelectorAll('a[href*="/analytics"]');
        for (const link of allLinks) {
          const label = link.getAttribute('aria-label') || '';
          const match = label.match(/([\d,\.]+[KMB]?)/i);
          if (match) {
            let numStr = match[1].toUpperCase().replace(/,/g, '');
            let multiplier = 1;
            if (numStr.includes('K')) { multiplier = 1000; numStr = numStr.replace('K', ''); }
            else if (numStr.includes('M')) { multiplier = 1000000; numStr = numStr.replace('M', ''); }
            else if (numStr.includes('B')) { multiplier = 1000000000; numStr = numStr.replace('B', ''); }
            views = Math.round(parseFloat(numStr) * multiplier);
            if (views > 0) break;
          }
        }
      }

      const timeEl = postEl.querySelector('time');
      const postedAt = timeEl ? timeEl.getAttribute('datetime') || '' : '';

      const timeLink = timeEl?.closest('a');
      const url = timeLink ? 'https://x.com' + timeLink.getAttribute('href') : '';

      if (authorHandle || url || text) {
        posts.push({
          text,
          authorHandle,
          authorName,
          likes,
          reposts,
          replies,
          views,
          postedAt,
          url,
          isRepost,
        });
      }
    } catch (err) {}
  }
  return posts;
})()
"#;

/// Scroll forward by twice the viewport height.
pub const SCROLL_JS: &str = "window.scrollBy(0, window.innerHeight * 2)";

/// All post texts on a permalink page written by the given author, in
/// rendered order. Used for thread reassembly and truncated-text recovery.
pub fn author_texts_js(author_handle: &str) -> String {
    format!(
        r#"
(() => {{
  const texts = [];
  const posts = document.querySelectorAll('[data-testid="tweet"]');
  const targetAuthor = "{}";

  for (const postEl of posts) {{
    const userLink = postEl.querySelector('[data-testid="User-Name"] a[href^="/"]');
    const handle = userLink?.getAttribute('href')?.slice(1)?.split('/')[0];

    if (handle === targetAuthor) {{
      const textEl = postEl.querySelector('[data-testid="tweetText"]');
      if (textEl) {{
        texts.push(textEl.innerText.trim());
      }}
    }}
  }}
  return texts;
}})()
"#,
        author_handle
    )
}
